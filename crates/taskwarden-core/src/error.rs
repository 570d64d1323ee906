//! Error types surfaced by every engine operation.

/// Distinguishable failure kinds. Callers match on the variant, not the message.
#[derive(Debug, thiserror::Error)]
pub enum TaskWardenError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Assignee not found: {0}")]
    AssigneeNotFound(String),

    #[error("Assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("Delegation '{delegation_id}' not found on assignment '{assignment_id}'")]
    DelegationNotFound {
        assignment_id: String,
        delegation_id: String,
    },

    #[error("No suitable assignee for task {0}")]
    NoSuitableAssignee(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("Invalid transition for {entity} '{id}': {reason}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaskWardenError>;
