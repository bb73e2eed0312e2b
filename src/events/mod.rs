pub(crate) mod events_model;
pub(crate) mod events_traits;

// Re-export the public interface
pub use events_model::{ActivityEventType, ActivityRecord, Severity};
pub use events_traits::{record_best_effort, ActivitySinkTrait};
