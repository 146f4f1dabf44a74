//! Error types for the token object core.
//!
//! Every operation in the crate reports failure through the single [`Error`]
//! enum; nothing panics or aborts on an ordinary failure path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::attrs::AttributeType;
use crate::id::{ObjectHandle, ObjectId};

/// Root error type for the token object core.
#[derive(Debug, Error)]
pub enum Error {
    /// Allocation failed while deep-copying a caller buffer. The caller's own
    /// buffers remain valid and owned by the caller.
    #[error("out of memory while copying a buffer")]
    OutOfMemory,

    /// The handle does not resolve to a live object in the registry.
    #[error("invalid object handle: {0}")]
    ObjectHandleInvalid(ObjectHandle),

    /// The attribute type is not recognized, not present, or not accessible
    /// through this operation.
    #[error("invalid attribute type: {0}")]
    AttributeTypeInvalid(AttributeType),

    /// A creation template failed structural validation.
    #[error("inconsistent template: {0}")]
    TemplateInconsistent(String),

    /// A search is already active for this session.
    #[error("object search already active for this session")]
    OperationActive,

    /// No search is active for this session.
    #[error("no object search active for this session")]
    OperationNotInitialized,

    /// Destruction was refused because an operation still holds the object.
    #[error("object {0} is in use")]
    ObjectInUse(ObjectHandle),

    /// A caller-provided buffer cannot hold the attribute value.
    #[error("buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    /// The trust-module transport reported a failure.
    #[error("trust module failure: {0}")]
    TrustModule(String),

    /// A usage-tracker contract violation or other invariant breach. This is
    /// a defect in the caller, not a recoverable runtime state.
    #[error("invariant violation: {0}")]
    General(Violation),
}

/// Result type used throughout the token object core.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured diagnostic attached to [`Error::General`].
///
/// Records which operation violated an internal contract and on which object,
/// so the defect can be traced without source-location strings.
#[derive(Clone, Debug, Serialize)]
pub struct Violation {
    /// Name of the operation that performed the violating call.
    pub operation: &'static str,
    /// Internal id of the object involved, when one was resolvable.
    pub object: Option<ObjectId>,
    /// When the violation was observed.
    pub at: DateTime<Utc>,
}

impl Violation {
    pub fn new(operation: &'static str, object: Option<ObjectId>) -> Self {
        Self {
            operation,
            object,
            at: Utc::now(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object {
            Some(id) => write!(f, "{} on object {} at {}", self.operation, id, self.at),
            None => write!(f, "{} on unresolvable object at {}", self.operation, self.at),
        }
    }
}
