//! Which server paths the remote side already has (or is about to get).

use crate::reference::ServerPath;
use std::collections::BTreeMap;
use std::fmt;

/// Sync status of one server path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileStatus {
    /// Bundled by a resolver pass, not yet handed to an upload.
    Parsed,
    /// Carried by the upload with this request identifier.
    InFlight(String),
    /// The upload carrying it completed successfully.
    Acknowledged,
}

impl FileStatus {
    /// Returns true if the entry is waiting for an upload.
    pub fn is_parsed(&self) -> bool {
        matches!(self, FileStatus::Parsed)
    }

    /// Returns true if the entry belongs to the given upload.
    pub fn is_in_flight_for(&self, request_id: &str) -> bool {
        matches!(self, FileStatus::InFlight(id) if id == request_id)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Parsed => f.write_str("parsed"),
            FileStatus::InFlight(id) => write!(f, "in-flight:{id}"),
            FileStatus::Acknowledged => f.write_str("acknowledged"),
        }
    }
}

/// Server paths known for the current session, with their status.
///
/// # Invariants
///
/// - Entries are never removed; only their status changes.
/// - An `Acknowledged` entry never goes back to another status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownFiles {
    entries: BTreeMap<ServerPath, FileStatus>,
}

impl KnownFiles {
    /// Creates an empty set, as at the start of a session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the path is known in any status.
    pub fn has(&self, path: &ServerPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Returns the status of a path.
    pub fn status(&self, path: &ServerPath) -> Option<&FileStatus> {
        self.entries.get(path)
    }

    /// Inserts or updates an entry. Acknowledged entries stay acknowledged.
    pub fn merge(&mut self, path: ServerPath, status: FileStatus) {
        match self.entries.get_mut(&path) {
            Some(FileStatus::Acknowledged) => {}
            Some(current) => *current = status,
            None => {
                self.entries.insert(path, status);
            }
        }
    }

    /// Retags every `parsed` entry as in flight for `request_id`.
    ///
    /// Returns the number of retagged entries.
    pub fn mark_in_flight(&mut self, request_id: &str) -> usize {
        self.retag(FileStatus::is_parsed, FileStatus::InFlight(request_id.to_string()))
    }

    /// Marks every entry carried by `request_id` as acknowledged.
    pub fn acknowledge(&mut self, request_id: &str) -> usize {
        self.retag(|s| s.is_in_flight_for(request_id), FileStatus::Acknowledged)
    }

    /// Returns every entry carried by `request_id` to `parsed`.
    pub fn release(&mut self, request_id: &str) -> usize {
        self.retag(|s| s.is_in_flight_for(request_id), FileStatus::Parsed)
    }

    fn retag(&mut self, select: impl Fn(&FileStatus) -> bool, status: FileStatus) -> usize {
        let mut count = 0;
        for current in self.entries.values_mut() {
            if select(current) {
                *current = status.clone();
                count += 1;
            }
        }
        count
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries in the given status.
    pub fn count(&self, status: &FileStatus) -> usize {
        self.entries.values().filter(|s| *s == status).count()
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&ServerPath, &FileStatus)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::reference::ContentAddress;

    fn path(name: &str) -> ServerPath {
        ServerPath::new(EntityKind::Model, name, &ContentAddress::from_hex("00"))
    }

    #[test]
    fn status_display() {
        assert_eq!(FileStatus::Parsed.to_string(), "parsed");
        assert_eq!(
            FileStatus::InFlight("requested-1".into()).to_string(),
            "in-flight:requested-1"
        );
        assert_eq!(FileStatus::Acknowledged.to_string(), "acknowledged");
    }

    #[test]
    fn upload_lifecycle() {
        let mut known = KnownFiles::new();
        known.merge(path("a"), FileStatus::Parsed);
        known.merge(path("b"), FileStatus::Parsed);

        assert_eq!(known.mark_in_flight("r1"), 2);
        known.merge(path("c"), FileStatus::Parsed);
        assert_eq!(known.count(&FileStatus::InFlight("r1".into())), 2);

        assert_eq!(known.acknowledge("r1"), 2);
        assert_eq!(known.status(&path("a")), Some(&FileStatus::Acknowledged));
        assert_eq!(known.status(&path("c")), Some(&FileStatus::Parsed));
    }

    #[test]
    fn release_returns_entries_to_parsed() {
        let mut known = KnownFiles::new();
        known.merge(path("a"), FileStatus::Parsed);
        known.mark_in_flight("r1");
        assert_eq!(known.release("r1"), 1);
        assert_eq!(known.status(&path("a")), Some(&FileStatus::Parsed));
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn acknowledged_is_final() {
        let mut known = KnownFiles::new();
        known.merge(path("a"), FileStatus::Acknowledged);
        known.merge(path("a"), FileStatus::Parsed);
        assert_eq!(known.status(&path("a")), Some(&FileStatus::Acknowledged));
        assert_eq!(known.mark_in_flight("r2"), 0);
    }
}
