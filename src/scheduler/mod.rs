pub(crate) mod scheduler_errors;
pub(crate) mod scheduler_model;
pub(crate) mod scheduler_service;
pub(crate) mod scheduler_traits;

// Re-export the public interface
pub use scheduler_errors::SchedulerError;
pub use scheduler_model::{SchedulerAction, SchedulerConfig, SchedulerState, SchedulerStatus};
pub use scheduler_service::SchedulerService;
pub use scheduler_traits::{ActiveSymbolsTrait, MonitoredSymbols};
