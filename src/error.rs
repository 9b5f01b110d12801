use miette::Diagnostic;
use thiserror::Error;

/// Result type for IR construction and analysis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for the IR library
///
/// Expected malformed-input conditions (unresolvable loop nestings,
/// degenerate loop descriptions) are not errors; they are reported as
/// [`crate::analysis::Diagnostic`] values and processing continues. The
/// variants here are fatal for the current method.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum Error {
    #[error("ownership violation: {message}")]
    #[diagnostic(code(jvm_cfg::ownership_violation))]
    Ownership { message: String },

    #[error("IR verification failed at {location}: {message}")]
    #[diagnostic(code(jvm_cfg::verifier_error))]
    Verifier { location: String, message: String },

    #[error("internal error: {message}")]
    #[diagnostic(code(jvm_cfg::internal_error))]
    Internal { message: String },
}

impl Error {
    /// Create an ownership-violation error
    pub fn ownership(message: impl Into<String>) -> Self {
        Error::Ownership {
            message: message.into(),
        }
    }

    /// Create a verifier error anchored at the offending block or instruction
    pub fn verifier(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Verifier {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}
