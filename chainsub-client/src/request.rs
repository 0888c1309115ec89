//! Request id generation
//!
//! Every subscribe and unsubscribe call carries a numeric id the server
//! echoes back in its response. The reader correlates confirmations by that
//! id alone, so an id must never be handed out twice on one connection.
//!
//! # Strategies
//!
//! - **Sequential** (default): 1, 2, 3, ...
//! - **Random63**: uniformly drawn from `1..=i64::MAX`
//! - **Random31**: uniformly drawn from `1..=i32::MAX`, for endpoints that
//!   parse ids into 32-bit integers
//!
//! Random strategies remember every id issued and redraw on collision.

use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How request ids are chosen for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Monotonic ids starting at 1
    #[default]
    Sequential,
    /// Random 63-bit ids
    Random63,
    /// Random 31-bit ids
    Random31,
}

impl IdStrategy {
    fn upper_bound(self) -> u64 {
        match self {
            IdStrategy::Sequential | IdStrategy::Random63 => i64::MAX as u64,
            IdStrategy::Random31 => i32::MAX as u64,
        }
    }
}

struct IdState {
    next: u64,
    issued: HashSet<u64>,
}

/// Generator of connection-unique request ids
#[derive(Clone)]
pub(crate) struct RequestIdGenerator {
    strategy: IdStrategy,
    state: Arc<Mutex<IdState>>,
}

impl RequestIdGenerator {
    /// Create a generator using the given strategy
    pub(crate) fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            state: Arc::new(Mutex::new(IdState {
                next: 1,
                issued: HashSet::new(),
            })),
        }
    }

    /// Produce the next id
    pub(crate) async fn next_id(&self) -> u64 {
        let mut state = self.state.lock().await;
        match self.strategy {
            IdStrategy::Sequential => {
                let id = state.next;
                state.next += 1;
                id
            }
            strategy => loop {
                let id = draw(strategy.upper_bound());
                if state.issued.insert(id) {
                    break id;
                }
            },
        }
    }

    /// Number of ids handed out so far
    #[cfg(test)]
    pub(crate) async fn issued(&self) -> usize {
        let state = self.state.lock().await;
        match self.strategy {
            IdStrategy::Sequential => (state.next - 1) as usize,
            _ => state.issued.len(),
        }
    }
}

fn draw(upper: u64) -> u64 {
    rand::thread_rng().gen_range(1..=upper)
}
