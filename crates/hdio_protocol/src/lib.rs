//! # HDIO Protocol
//!
//! Entity types, content addressing and reference resolution for HDML sync.
//!
//! This crate provides:
//! - `Connection`, `Model` and `Frame` entities and the `Document` holding them
//! - `LocalReference`, `ContentAddress` and `ServerPath`
//! - The canonical binary form, its SHA-256 content address and the `Bundle`
//!   packaging new entities into one asset
//! - `KnownFiles`, the per-session record of what the server has
//! - The resolver turning a document into a deduplicated batch
//! - A tolerant HDML markup parser
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use hdio_protocol::{resolve, Connection, Document, Frame, KnownFiles, Model};
//!
//! let document = Document::new()
//!     .with(Connection::new("pg"))
//!     .with(Model::new("users"))
//!     .with(Frame::new("active", "?hdml-model=users"));
//!
//! let first = resolve(&KnownFiles::new(), &document).unwrap();
//! assert_eq!(first.batch.len(), 3);
//!
//! // Everything is known now, so nothing is bundled again.
//! let second = resolve(&first.known, &document).unwrap();
//! assert!(second.batch.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod entity;
mod error;
mod known;
mod markup;
mod reference;
mod resolver;

pub use codec::{address, content_address, serialize, Bundle, BUNDLE_VERSION};
pub use entity::{Attributes, Connection, Document, Entity, EntityKind, Frame, Model, Node};
pub use error::{ProtocolError, ProtocolResult, ResolveError};
pub use known::{FileStatus, KnownFiles};
pub use markup::{HdmlParser, MarkupParser};
pub use reference::{
    canonical_path, ContentAddress, FrameSource, LocalReference, ReferenceMapping, ServerPath,
};
pub use resolver::{resolve, server_path_of, Resolution};
