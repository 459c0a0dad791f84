// src/error.rs — Error types shared across the relay.

/// Outcomes of a signaling operation that are local to the acting connection.
/// None of them tear down the connection or touch any other connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("Credential rejected")]
    AuthFailed,

    #[error("Credential belongs to '{asserted}', not '{claimed}'")]
    HandleMismatch { claimed: String, asserted: String },

    #[error("Handle cannot be empty")]
    EmptyHandle,

    #[error("'{0}' is not reachable")]
    TargetUnreachable(String),

    /// Message arrived in a state that does not accept it. Dropped, never reported.
    #[error("Invalid transition: {0}")]
    InvalidTransition(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: {value:?}")]
    Invalid {
        var:      &'static str,
        expected: &'static str,
        value:    String,
    },
}
