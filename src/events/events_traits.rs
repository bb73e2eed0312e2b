use async_trait::async_trait;
use log::warn;

use super::events_model::ActivityRecord;
use crate::errors::Result;

/// External activity/alert sink. Implemented outside the core; writing to it
/// must never fail the originating operation.
#[async_trait]
pub trait ActivitySinkTrait: Send + Sync {
    async fn record(&self, record: ActivityRecord) -> Result<()>;
}

/// Write an activity record, swallowing sink failures with a warning.
pub async fn record_best_effort(sink: &dyn ActivitySinkTrait, record: ActivityRecord) {
    let event_type = record.event_type;
    if let Err(e) = sink.record(record).await {
        warn!(
            "Failed to write '{}' activity record: {}",
            event_type.as_str(),
            e
        );
    }
}
