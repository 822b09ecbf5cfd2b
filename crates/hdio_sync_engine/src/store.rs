//! Session-scoped sync state.

use crate::error::SyncResult;
use hdio_protocol::{
    resolve, server_path_of, Bundle, Document, Entity, FileStatus, KnownFiles, ReferenceMapping,
    Resolution, ResolveError, ServerPath,
};
use tracing::debug;

/// Cross-pass state of one session.
///
/// Holds which server paths the remote side knows about, plus the mapping,
/// pending batch and errors of the most recent pass. Owned by a single
/// execution context; nothing here is shared.
///
/// # Invariants
///
/// - `known` only grows for the lifetime of the store.
/// - The pending batch is rebuilt on every pass from the pass's new entities
///   plus every earlier entity not yet acknowledged, and again whenever an
///   upload is acknowledged or released. It never holds an acknowledged
///   entity, and every `parsed` or in-flight entry is in it.
#[derive(Debug, Default)]
pub struct SyncStore {
    known: KnownFiles,
    mapping: ReferenceMapping,
    unsent: Vec<(ServerPath, Entity)>,
    pending_batch: Vec<u8>,
    errors: Vec<ResolveError>,
    passes: u64,
}

impl SyncStore {
    /// Creates an empty store, as at the start of a session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the path is known in any status.
    pub fn has(&self, path: &ServerPath) -> bool {
        self.known.has(path)
    }

    /// Inserts or updates an entry.
    pub fn merge(&mut self, path: ServerPath, status: FileStatus) {
        self.known.merge(path, status);
    }

    /// Returns a copy of the known set.
    pub fn snapshot(&self) -> KnownFiles {
        self.known.clone()
    }

    /// Returns the known set.
    pub fn known(&self) -> &KnownFiles {
        &self.known
    }

    /// Mapping of the most recent pass.
    pub fn mapping(&self) -> &ReferenceMapping {
        &self.mapping
    }

    /// Packaged pending batch.
    pub fn pending_batch(&self) -> &[u8] {
        &self.pending_batch
    }

    /// Number of entities in the pending batch.
    pub fn pending_count(&self) -> usize {
        self.unsent.len()
    }

    /// Per-entity errors of the most recent pass.
    pub fn errors(&self) -> &[ResolveError] {
        &self.errors
    }

    /// Number of passes run against this store.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Runs one resolver pass over `document` and applies the result.
    ///
    /// Returns the resolution so callers can inspect the batch and errors.
    pub fn resolve(&mut self, document: &Document) -> SyncResult<Resolution> {
        let resolution = resolve(&self.known, document)?;
        self.apply(&resolution)?;
        Ok(resolution)
    }

    /// Applies a resolution computed against this store's known set.
    pub fn apply(&mut self, resolution: &Resolution) -> SyncResult<()> {
        for (path, status) in resolution.known.iter() {
            if !self.known.has(path) {
                self.known.merge(path.clone(), status.clone());
            }
        }

        self.drop_acknowledged();
        let carried = self.unsent.len();

        let batch = &resolution.batch;
        let new_entities = batch
            .connections
            .iter()
            .cloned()
            .map(Entity::Connection)
            .chain(batch.models.iter().cloned().map(Entity::Model))
            .chain(batch.frames.iter().cloned().map(Entity::Frame));
        for entity in new_entities {
            let path = server_path_of(&entity)?;
            self.unsent.push((path, entity));
        }

        self.repackage()?;
        self.mapping = resolution.mapping.clone();
        self.errors = resolution.errors.clone();
        self.passes += 1;
        debug!(
            known = self.known.len(),
            pending = self.unsent.len(),
            carried,
            "applied resolution"
        );
        Ok(())
    }

    /// Retags every `parsed` entry as carried by `request_id`.
    pub fn mark_in_flight(&mut self, request_id: &str) -> usize {
        self.known.mark_in_flight(request_id)
    }

    /// Confirms every entry carried by `request_id` and drops those
    /// entities from the pending batch.
    pub fn acknowledge(&mut self, request_id: &str) -> SyncResult<usize> {
        let confirmed = self.known.acknowledge(request_id);
        self.drop_acknowledged();
        self.repackage()?;
        Ok(confirmed)
    }

    /// Returns every entry carried by a failed `request_id` to `parsed`.
    pub fn release(&mut self, request_id: &str) -> SyncResult<usize> {
        let released = self.known.release(request_id);
        self.repackage()?;
        Ok(released)
    }

    fn drop_acknowledged(&mut self) {
        let known = &self.known;
        self.unsent
            .retain(|(path, _)| !matches!(known.status(path), Some(FileStatus::Acknowledged)));
    }

    fn repackage(&mut self) -> SyncResult<()> {
        let mut pending = Bundle::new();
        for (_, entity) in &self.unsent {
            pending.push(entity.clone());
        }
        self.pending_batch = pending.package()?;
        Ok(())
    }
}
