//! Error types shared by every layer of the core.
//!
//! Errors are `Clone` because a failure caught at a chore boundary may be
//! stored in an error boundary and rendered later.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Everything that can go wrong while tracking, scheduling, diffing,
/// serializing or resuming.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A component's render function failed.
    #[error("render of `{component}` failed: {message}")]
    Render { component: String, message: String },

    /// A task, visible task or resource failed (sync or async).
    #[error("task `{task}` failed: {message}")]
    Task { task: String, message: String },

    /// An event handler failed. Not routed to error boundaries.
    #[error("handler `{handler}` for `{event}` failed: {message}")]
    Handler {
        handler: String,
        event: String,
        message: String,
    },

    /// A `<textarea>` received a non-string reactive `value`.
    #[error("textarea `value` must be a string, found {found}")]
    TextareaValue { found: &'static str },

    /// An attribute value could not be normalized for the host.
    #[error("invalid attribute `{name}`: {reason}")]
    InvalidAttribute { name: String, reason: String },

    /// A computed signal was read while it was computing.
    #[error("computed signal {0} read while computing")]
    ComputedCycle(u64),

    /// The scheduler contract was violated.
    #[error("scheduler integrity violation: {0}")]
    SchedulerIntegrity(String),

    /// A drain was requested from inside a running chore.
    #[error("drain requested from inside a running chore")]
    RecursiveDrain,

    /// The loader does not know the requested symbol.
    #[error("symbol `{chunk}#{symbol}` is not registered")]
    UnknownSymbol { chunk: String, symbol: String },

    /// The loader returned a symbol of the wrong kind.
    #[error("symbol `{symbol}` is not a {expected}")]
    SymbolType {
        symbol: String,
        expected: &'static str,
    },

    /// A handle was used synchronously before it was resolved.
    #[error("symbol `{0}` used before it was resolved")]
    Unresolved(String),

    /// A vnode or host node could not be found.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// State could not be serialized or deserialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Server artifacts do not match the host tree.
    #[error("resume failed: {0}")]
    Resume(String),

    /// A value had an unexpected shape.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Free-form error raised by application code.
    #[error("{0}")]
    Message(String),
}

impl CoreError {
    /// Builds an application error from any displayable value.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Message(message.to_string())
    }

    /// Short human readable description, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Render { message, .. }
            | Self::Task { message, .. }
            | Self::Handler { message, .. } => message.clone(),
            Self::Message(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CoreError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CoreError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_strips_context() {
        let err = CoreError::Render {
            component: "App".into(),
            message: "boom".into(),
        };
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "render of `App` failed: boom");
    }

    #[test]
    fn json_errors_convert() {
        let err: CoreError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
