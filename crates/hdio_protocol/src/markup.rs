//! Markup scanning: HDML text to a structured [`Document`].
//!
//! The scanner is deliberately tolerant. It understands start, end and
//! self-closing tags, quoted and unquoted attributes, comments and HTML void
//! elements; text content is ignored. Unclosed elements are closed at the
//! end of input and stray end tags are dropped.

use crate::entity::{Attributes, Connection, Document, Entity, EntityKind, Frame, Model, Node};
use crate::error::{ProtocolError, ProtocolResult};
use tracing::debug;

/// Turns markup into a structured document.
pub trait MarkupParser: Send + Sync {
    /// Parses one markup snapshot.
    fn parse(&self, markup: &str) -> ProtocolResult<Document>;
}

/// Parser for `hdml-connection`, `hdml-model` and `hdml-frame` elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct HdmlParser;

impl HdmlParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self
    }
}

impl MarkupParser for HdmlParser {
    fn parse(&self, markup: &str) -> ProtocolResult<Document> {
        let root = scan(markup)?;
        let mut document = Document::new();
        collect(&root.children, &mut document);
        Ok(document)
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn collect(nodes: &[Node], document: &mut Document) {
    for node in nodes {
        match EntityKind::from_tag(&node.tag) {
            Some(kind) => {
                if let Some(entity) = to_entity(kind, node) {
                    document.push(entity);
                }
            }
            None => collect(&node.children, document),
        }
    }
}

fn to_entity(kind: EntityKind, node: &Node) -> Option<Entity> {
    let mut attributes = node.attributes.clone();
    let Some(name) = attributes.remove("name").filter(|n| !n.is_empty()) else {
        debug!(tag = %node.tag, "ignoring element without a name");
        return None;
    };
    let entity = match kind {
        EntityKind::Connection => Entity::Connection(Connection { name, attributes }),
        EntityKind::Model => Entity::Model(Model {
            name,
            attributes,
            definition: node.children.clone(),
        }),
        EntityKind::Frame => {
            let source = attributes.remove("source").unwrap_or_default();
            Entity::Frame(Frame {
                name,
                source,
                attributes,
                definition: node.children.clone(),
            })
        }
    };
    Some(entity)
}

fn scan(input: &str) -> ProtocolResult<Node> {
    let bytes = input.as_bytes();
    let mut stack = vec![Node::new("#root")];
    let mut pos = 0;

    while let Some(offset) = input[pos..].find('<') {
        pos += offset;
        if input[pos..].starts_with("<!--") {
            pos = match input[pos + 4..].find("-->") {
                Some(end) => pos + 4 + end + 3,
                None => return Err(markup_error(pos, "unterminated comment")),
            };
            continue;
        }
        if input[pos..].starts_with("<!") || input[pos..].starts_with("<?") {
            pos = match input[pos..].find('>') {
                Some(end) => pos + end + 1,
                None => return Err(markup_error(pos, "unterminated declaration")),
            };
            continue;
        }
        if input[pos..].starts_with("</") {
            let start = pos + 2;
            let end = input[start..]
                .find('>')
                .map(|e| start + e)
                .ok_or_else(|| markup_error(pos, "unterminated end tag"))?;
            let tag = input[start..end].trim().to_ascii_lowercase();
            close(&mut stack, &tag);
            pos = end + 1;
            continue;
        }

        let name_start = pos + 1;
        let name_end = scan_while(bytes, name_start, is_name_byte);
        if name_end == name_start {
            // A bare '<' in text.
            pos += 1;
            continue;
        }
        let tag = input[name_start..name_end].to_ascii_lowercase();
        let (attributes, self_closing, after) = scan_attributes(input, name_end)?;
        pos = after;

        let node = Node {
            tag,
            attributes,
            children: Vec::new(),
        };
        if self_closing || VOID_ELEMENTS.contains(&node.tag.as_str()) {
            push_child(&mut stack, node);
        } else {
            stack.push(node);
        }
    }

    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    stack
        .pop()
        .ok_or_else(|| markup_error(input.len(), "empty element stack"))
}

fn scan_attributes(input: &str, mut pos: usize) -> ProtocolResult<(Attributes, bool, usize)> {
    let bytes = input.as_bytes();
    let mut attributes = Attributes::new();
    loop {
        pos = scan_while(bytes, pos, |b| b.is_ascii_whitespace());
        match bytes.get(pos) {
            None => return Err(markup_error(pos, "unterminated start tag")),
            Some(b'>') => return Ok((attributes, false, pos + 1)),
            Some(b'/') if bytes.get(pos + 1) == Some(&b'>') => {
                return Ok((attributes, true, pos + 2));
            }
            Some(b'/') => {
                pos += 1;
                continue;
            }
            Some(_) => {}
        }

        let key_start = pos;
        pos = scan_while(bytes, pos, |b| {
            !b.is_ascii_whitespace() && b != b'=' && b != b'>' && b != b'/'
        });
        let key = input[key_start..pos].to_ascii_lowercase();
        pos = scan_while(bytes, pos, |b| b.is_ascii_whitespace());

        if bytes.get(pos) != Some(&b'=') {
            attributes.insert(key, String::new());
            continue;
        }
        pos = scan_while(bytes, pos + 1, |b| b.is_ascii_whitespace());

        let value = match bytes.get(pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let start = pos + 1;
                let end = input[start..]
                    .find(quote as char)
                    .map(|e| start + e)
                    .ok_or_else(|| markup_error(pos, "unterminated attribute value"))?;
                pos = end + 1;
                &input[start..end]
            }
            Some(_) => {
                let start = pos;
                pos = scan_while(bytes, pos, |b| !b.is_ascii_whitespace() && b != b'>');
                &input[start..pos]
            }
            None => return Err(markup_error(pos, "unterminated start tag")),
        };
        attributes.insert(key, decode_entities(value));
    }
}

fn close(stack: &mut Vec<Node>, tag: &str) {
    let Some(depth) = stack.iter().rposition(|n| n.tag == tag) else {
        return;
    };
    if depth == 0 {
        return;
    }
    while stack.len() > depth {
        pop_into_parent(stack);
    }
}

fn pop_into_parent(stack: &mut Vec<Node>) {
    if let Some(node) = stack.pop() {
        push_child(stack, node);
    }
}

fn push_child(stack: &mut [Node], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn scan_while(bytes: &[u8], mut pos: usize, pred: impl Fn(u8) -> bool) -> usize {
    while pos < bytes.len() && pred(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn markup_error(offset: usize, message: &str) -> ProtocolError {
    ProtocolError::Markup {
        offset,
        message: message.to_string(),
    }
}
