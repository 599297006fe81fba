//! Error taxonomy for the kernel's public surface.
//!
//! Every fallible operation returns [`KernelError`]. Operations validate all
//! preconditions before the first write, so a returned error implies the model
//! was left untouched.

use thiserror::Error;

/// Errors surfaced by the object pool, model facade, routing engine, order
/// lifecycle and kernel supervisor.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A reference did not resolve to a live object in the pool.
    #[error("unknown object: {0}")]
    ObjectUnknown(String),

    /// A name or id collided with an existing object.
    #[error("object already exists: {0}")]
    ObjectExists(String),

    /// An out-of-range or inconsistent argument value.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The operation is not allowed in the object's current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The operation is not supported in the current kernel mode.
    #[error("unsupported kernel operation: {0}")]
    UnsupportedKernelOp(String),

    /// The caller lacks the required permission.
    #[error("insufficient credentials: {0}")]
    Credentials(String),

    /// A user account with that name already exists.
    #[error("user already exists: {0}")]
    UserExists(String),

    /// No user account with that name exists.
    #[error("unknown user: {0}")]
    UserUnknown(String),

    /// Persistence failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A model or script document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KernelError>;
