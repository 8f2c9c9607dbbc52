// Persistence for run results
//
// Two append-only stores: failure records for runs that need a human
// (exhausted retries or failed delivery) and analytics rows for published
// posts. The engagement store tracks mentions and the replies sent to them.

mod analytics;
mod engagement;
mod failure;

pub use analytics::{PublishedRecord, SqliteAnalyticsStore};
pub use engagement::{EngagementStats, SqliteEngagementStore};
pub use failure::{FailureRecord, FailureStatus, JsonFailureStore};

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait FailureStore: Send + Sync {
    async fn append(&self, record: &FailureRecord) -> Result<()>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn append(&self, record: &PublishedRecord) -> Result<()>;
}
