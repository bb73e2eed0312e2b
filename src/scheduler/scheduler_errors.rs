use thiserror::Error;

use super::scheduler_model::{SchedulerAction, SchedulerState};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Cannot {action} while scheduler is {state}")]
    InvalidTransition {
        action: SchedulerAction,
        state: SchedulerState,
    },
}
