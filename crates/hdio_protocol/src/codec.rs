//! Binary form, content addressing and bundling.
//!
//! An entity's binary form is a one-byte kind code followed by the CBOR
//! encoding of the entity. All attribute sets are ordered maps, so equal
//! entities always encode to equal bytes.
//!
//! The content address is the SHA-256 of the standard base64 text of the
//! binary form, not of the raw bytes.

use crate::entity::{Connection, Entity, EntityKind, Frame, Model};
use crate::error::{ProtocolError, ProtocolResult};
use crate::reference::{ContentAddress, ServerPath};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Encodes an entity to its binary form.
pub fn serialize(entity: &Entity) -> ProtocolResult<Vec<u8>> {
    let mut buffer = vec![entity.kind().type_code()];
    let result = match entity {
        Entity::Connection(c) => ciborium::into_writer(c, &mut buffer),
        Entity::Model(m) => ciborium::into_writer(m, &mut buffer),
        Entity::Frame(f) => ciborium::into_writer(f, &mut buffer),
    };
    result.map_err(|e| ProtocolError::codec(e.to_string()))?;
    Ok(buffer)
}

/// Computes the content address of a binary form.
pub fn content_address(bytes: &[u8]) -> ContentAddress {
    let encoded = STANDARD.encode(bytes);
    let digest = Sha256::digest(encoded.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    ContentAddress::from_hex(hex)
}

/// Serializes an entity and derives its content address and server path.
pub fn address(entity: &Entity) -> ProtocolResult<(ContentAddress, ServerPath)> {
    let bytes = serialize(entity)?;
    let address = content_address(&bytes);
    let path = ServerPath::new(entity.kind(), entity.name(), &address);
    Ok((address, path))
}

/// Bundle format version written into every packaged asset.
pub const BUNDLE_VERSION: u8 = 1;

/// A set of entities packaged together for upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// New connections.
    pub connections: Vec<Connection>,
    /// New models.
    pub models: Vec<Model>,
    /// New frames, with resolved sources.
    pub frames: Vec<Frame>,
}

#[derive(Serialize, Deserialize)]
struct PackagedBundle {
    version: u8,
    bundle: Bundle,
}

impl Bundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity to the list of its kind.
    pub fn push(&mut self, entity: Entity) {
        match entity {
            Entity::Connection(c) => self.connections.push(c),
            Entity::Model(m) => self.models.push(m),
            Entity::Frame(f) => self.frames.push(f),
        }
    }

    /// Total number of entities.
    pub fn len(&self) -> usize {
        self.connections.len() + self.models.len() + self.frames.len()
    }

    /// Returns true if the bundle carries nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entities of one kind.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Connection => self.connections.len(),
            EntityKind::Model => self.models.len(),
            EntityKind::Frame => self.frames.len(),
        }
    }

    /// Packages the bundle into one binary asset.
    pub fn package(&self) -> ProtocolResult<Vec<u8>> {
        let packaged = PackagedBundle {
            version: BUNDLE_VERSION,
            bundle: self.clone(),
        };
        let mut buffer = Vec::new();
        ciborium::into_writer(&packaged, &mut buffer)
            .map_err(|e| ProtocolError::codec(e.to_string()))?;
        Ok(buffer)
    }

    /// Reads a packaged asset back into a bundle.
    pub fn unpack(bytes: &[u8]) -> ProtocolResult<Self> {
        let packaged: PackagedBundle =
            ciborium::from_reader(bytes).map_err(|e| ProtocolError::codec(e.to_string()))?;
        if packaged.version != BUNDLE_VERSION {
            return Err(ProtocolError::codec(format!(
                "unsupported bundle version {}",
                packaged.version
            )));
        }
        Ok(packaged.bundle)
    }
}
