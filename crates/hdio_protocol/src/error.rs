//! Error types for the protocol crate.

use crate::entity::EntityKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while addressing, resolving or packaging entities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to encode or decode the binary form of an entity or bundle.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec error.
        message: String,
    },

    /// A frame source could not be rewritten into canonical path form.
    #[error("malformed source: {source_path}")]
    MalformedSource {
        /// The offending source string.
        source_path: String,
    },

    /// A local reference has no target in the current pass.
    #[error("dangling reference: {reference}")]
    DanglingReference {
        /// The unresolved reference, as written in the document.
        reference: String,
    },

    /// A string is not a valid `?hdml-<kind>=<name>` reference.
    #[error("invalid local reference: {0}")]
    InvalidReference(String),

    /// The markup could not be scanned.
    #[error("markup error at byte {offset}: {message}")]
    Markup {
        /// Byte offset in the input.
        offset: usize,
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Create a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create a malformed source error.
    pub fn malformed_source(source_path: impl Into<String>) -> Self {
        Self::MalformedSource {
            source_path: source_path.into(),
        }
    }

    /// Create a dangling reference error.
    pub fn dangling(reference: impl Into<String>) -> Self {
        Self::DanglingReference {
            reference: reference.into(),
        }
    }
}

/// A resolution failure scoped to one entity.
///
/// The resolver reports these alongside its output instead of aborting the
/// pass; every other entity is still addressed and bundled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} {name:?}: {error}")]
pub struct ResolveError {
    /// Kind of the failing entity.
    pub kind: EntityKind,
    /// Name of the failing entity.
    pub name: String,
    /// What went wrong.
    pub error: ProtocolError,
}

impl ResolveError {
    /// Returns true if this is a dangling-reference failure.
    pub fn is_dangling(&self) -> bool {
        matches!(self.error, ProtocolError::DanglingReference { .. })
    }
}
