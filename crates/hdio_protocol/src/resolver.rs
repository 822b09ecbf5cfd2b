//! Resolution, addressing and deduplication of a document.
//!
//! A pass walks the document in fixed priority order: connections, then
//! models, then frames, each group in document order. Connections and models
//! reference nothing, so by the time frames are reached every referenceable
//! non-frame entity already has a server path. Frames may only reference
//! entities declared before them; a reference to a later frame is dangling.
//!
//! For every entity the pass:
//! 1. resolves the frame source (absolute path, local reference, verbatim),
//! 2. serializes the resolved entity and derives its server path,
//! 3. records the local reference in the pass mapping,
//! 4. appends the entity to the batch unless its path is already known.
//!
//! Failures are scoped to the failing entity. It is left out of the mapping,
//! the batch and the known set, and the pass continues.

use crate::codec::{self, Bundle};
use crate::entity::{Document, Entity, EntityKind};
use crate::error::{ProtocolResult, ResolveError};
use crate::known::{FileStatus, KnownFiles};
use crate::reference::{FrameSource, LocalReference, ReferenceMapping, ServerPath};
use tracing::{debug, info, warn};

/// Output of one resolver pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Known set after this pass: the prior set plus every newly bundled path.
    pub known: KnownFiles,
    /// Local reference to server path, for every entity that resolved.
    pub mapping: ReferenceMapping,
    /// Entities whose server path was not known before this pass.
    pub batch: Bundle,
    /// The batch packaged into one binary asset.
    pub data: Vec<u8>,
    /// Per-entity failures.
    pub errors: Vec<ResolveError>,
}

impl Resolution {
    /// Returns true if the pass produced nothing to upload.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Returns the dangling-reference failures of this pass.
    pub fn dangling(&self) -> impl Iterator<Item = &ResolveError> {
        self.errors.iter().filter(|e| e.is_dangling())
    }
}

/// Resolves a document against the known set of the session.
///
/// `known` is not modified; the returned [`Resolution`] carries the derived
/// set. The same document and known set always produce the same resolution.
///
/// # Errors
///
/// Only packaging the batch can fail the whole pass. Per-entity problems are
/// reported in [`Resolution::errors`].
pub fn resolve(known: &KnownFiles, document: &Document) -> ProtocolResult<Resolution> {
    let mut pass = Pass {
        known: known.clone(),
        mapping: ReferenceMapping::new(),
        batch: Bundle::new(),
        errors: Vec::new(),
    };

    for connection in document.connections() {
        pass.admit(Entity::Connection(connection.clone()));
    }
    for model in document.models() {
        pass.admit(Entity::Model(model.clone()));
    }
    for frame in document.frames() {
        let mut frame = frame.clone();
        match FrameSource::classify(&frame.source).resolve(&pass.mapping) {
            Ok(source) => {
                frame.source = source;
                pass.admit(Entity::Frame(frame));
            }
            Err(error) => pass.reject(EntityKind::Frame, &frame.name, error),
        }
    }

    let data = pass.batch.package()?;
    info!(
        entities = document.len(),
        new = pass.batch.len(),
        errors = pass.errors.len(),
        "resolved document"
    );

    Ok(Resolution {
        known: pass.known,
        mapping: pass.mapping,
        batch: pass.batch,
        data,
        errors: pass.errors,
    })
}

struct Pass {
    known: KnownFiles,
    mapping: ReferenceMapping,
    batch: Bundle,
    errors: Vec<ResolveError>,
}

impl Pass {
    fn admit(&mut self, entity: Entity) {
        let kind = entity.kind();
        let (_, path) = match codec::address(&entity) {
            Ok(addressed) => addressed,
            Err(error) => {
                self.reject(kind, entity.name(), error);
                return;
            }
        };

        self.mapping
            .insert(LocalReference::new(kind, entity.name()), path.clone());

        if self.known.has(&path) {
            debug!(%path, "already known");
            return;
        }
        debug!(%path, "new entity");
        self.known.merge(path, FileStatus::Parsed);
        self.batch.push(entity);
    }

    fn reject(&mut self, kind: EntityKind, name: &str, error: crate::ProtocolError) {
        let error = ResolveError {
            kind,
            name: name.to_string(),
            error,
        };
        warn!(%error, "skipping entity");
        self.errors.push(error);
    }
}

/// Returns the server path an entity would get, without resolving anything.
///
/// Frame sources are taken as written.
pub fn server_path_of(entity: &Entity) -> ProtocolResult<ServerPath> {
    codec::address(entity).map(|(_, path)| path)
}
