//! Event-to-job dispatch for Conveyor.
//!
//! Watches external change feeds and turns detected changes into jobs:
//! rule matching, environment materialization, idempotent dispatch commits,
//! and the per-source poller workers that drive it all.

pub mod dispatcher;
pub mod envmap;
pub mod matcher;
pub mod poller;
pub mod pool;

pub use dispatcher::{DispatchPlan, Dispatcher, SkipReason};
pub use matcher::select_rule;
pub use poller::{PollStats, SourcePoller};
pub use pool::PollerPool;

use conveyor_db::DbError;
use conveyor_feed::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    /// Transient errors leave the cursor untouched and are retried with
    /// backoff; everything else aborts the affected poll only.
    pub fn is_transient(&self) -> bool {
        match self {
            DispatchError::Feed(FeedError::Unavailable(_)) => true,
            DispatchError::Feed(FeedError::Misconfigured(_)) => false,
            DispatchError::Db(DbError::Database(_)) => true,
            DispatchError::Db(_) => false,
        }
    }
}
