//! HDML entities: connections, models and frames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute set of an element. Ordered so the binary form is stable.
pub type Attributes = BTreeMap<String, String>;

/// The kind of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Data-source connection.
    Connection,
    /// Query/shape definition.
    Model,
    /// Named view over a connection, model or another frame.
    Frame,
}

impl EntityKind {
    /// All kinds, in resolution priority order.
    pub const ALL: [EntityKind; 3] = [EntityKind::Connection, EntityKind::Model, EntityKind::Frame];

    /// Returns the lowercase name used in references and server paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Connection => "connection",
            EntityKind::Model => "model",
            EntityKind::Frame => "frame",
        }
    }

    /// Parses a kind from its lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connection" => Some(EntityKind::Connection),
            "model" => Some(EntityKind::Model),
            "frame" => Some(EntityKind::Frame),
            _ => None,
        }
    }

    /// Returns the markup tag declaring entities of this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Connection => "hdml-connection",
            EntityKind::Model => "hdml-model",
            EntityKind::Frame => "hdml-frame",
        }
    }

    /// Returns the kind declared by a markup tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        tag.strip_prefix("hdml-").and_then(Self::from_name)
    }

    /// Type code prefixed to the serialized form, so entities of different
    /// kinds never share a content address.
    pub fn type_code(&self) -> u8 {
        match self {
            EntityKind::Connection => 1,
            EntityKind::Model => 2,
            EntityKind::Frame => 3,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A nested markup element carried as an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Element tag.
    pub tag: String,
    /// Element attributes.
    pub attributes: Attributes,
    /// Child elements, in document order.
    pub children: Vec<Node>,
}

impl Node {
    /// Creates an element with no attributes or children.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a child element.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }
}

/// A data-source connection. References nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Connection name.
    pub name: String,
    /// Connection attributes (type, host, credentials, ...).
    pub attributes: Attributes,
}

impl Connection {
    /// Creates a connection with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A model: a query or shape definition. References nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Model attributes.
    pub attributes: Attributes,
    /// Nested definition (tables, fields, joins).
    pub definition: Vec<Node>,
}

impl Model {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            definition: Vec::new(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a definition node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.definition.push(node);
        self
    }
}

/// A frame: a named view built from a source.
///
/// `source` is an absolute path (`/dir/file?query`), a local reference
/// (`?hdml-model=users`), or anything else, which is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame name.
    pub name: String,
    /// Frame source.
    pub source: String,
    /// Frame attributes.
    pub attributes: Attributes,
    /// Nested definition (fields, filters, sorting).
    pub definition: Vec<Node>,
}

impl Frame {
    /// Creates a frame over the given source.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            attributes: Attributes::new(),
            definition: Vec::new(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a definition node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.definition.push(node);
        self
    }
}

/// Any of the three entity kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    /// A connection.
    Connection(Connection),
    /// A model.
    Model(Model),
    /// A frame.
    Frame(Frame),
}

impl Entity {
    /// Returns the entity kind.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Connection(_) => EntityKind::Connection,
            Entity::Model(_) => EntityKind::Model,
            Entity::Frame(_) => EntityKind::Frame,
        }
    }

    /// Returns the entity name.
    pub fn name(&self) -> &str {
        match self {
            Entity::Connection(c) => &c.name,
            Entity::Model(m) => &m.name,
            Entity::Frame(f) => &f.name,
        }
    }
}

impl From<Connection> for Entity {
    fn from(value: Connection) -> Self {
        Entity::Connection(value)
    }
}

impl From<Model> for Entity {
    fn from(value: Model) -> Self {
        Entity::Model(value)
    }
}

impl From<Frame> for Entity {
    fn from(value: Frame) -> Self {
        Entity::Frame(value)
    }
}

/// A structured document: the entities declared in one markup snapshot,
/// in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    entities: Vec<Entity>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entity.
    pub fn push(&mut self, entity: impl Into<Entity>) {
        self.entities.push(entity.into());
    }

    /// Appends an entity, builder style.
    pub fn with(mut self, entity: impl Into<Entity>) -> Self {
        self.push(entity);
        self
    }

    /// All entities, in document order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the document declares nothing.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Connections, in document order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.entities.iter().filter_map(|e| match e {
            Entity::Connection(c) => Some(c),
            _ => None,
        })
    }

    /// Models, in document order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.entities.iter().filter_map(|e| match e {
            Entity::Model(m) => Some(m),
            _ => None,
        })
    }

    /// Frames, in document order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.entities.iter().filter_map(|e| match e {
            Entity::Frame(f) => Some(f),
            _ => None,
        })
    }
}

impl FromIterator<Entity> for Document {
    fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
        Self {
            entities: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_name(kind.as_str()), Some(kind));
            assert_eq!(EntityKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EntityKind::from_name("include"), None);
        assert_eq!(EntityKind::from_tag("hdml-include"), None);
        assert_eq!(EntityKind::from_tag("div"), None);
    }

    #[test]
    fn document_iterators_keep_order() {
        let doc = Document::new()
            .with(Frame::new("f1", "?hdml-model=m"))
            .with(Connection::new("pg"))
            .with(Model::new("m"))
            .with(Frame::new("f2", "?hdml-frame=f1"));

        assert_eq!(doc.len(), 4);
        assert_eq!(doc.connections().count(), 1);
        assert_eq!(doc.models().count(), 1);
        let frames: Vec<_> = doc.frames().map(|f| f.name.as_str()).collect();
        assert_eq!(frames, vec!["f1", "f2"]);
    }

    #[test]
    fn entity_accessors() {
        let entity: Entity = Model::new("users").into();
        assert_eq!(entity.kind(), EntityKind::Model);
        assert_eq!(entity.name(), "users");
    }
}
