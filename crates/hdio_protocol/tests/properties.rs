//! Property tests for the resolver.

use hdio_protocol::{
    resolve, Connection, Document, Entity, FileStatus, Frame, KnownFiles, Model, ServerPath,
};
use proptest::prelude::*;

fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

fn attributes_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((name_strategy(), "[a-zA-Z0-9 ]{0,12}"), 0..4)
}

/// Sources mixing absolute paths, references (possibly dangling) and
/// verbatim strings.
fn source_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (name_strategy(), name_strategy()).prop_map(|(a, b)| format!("/{a}/{b}?q={a}")),
        name_strategy().prop_map(|n| format!("?hdml-model={n}")),
        name_strategy().prop_map(|n| format!("?hdml-frame={n}")),
        name_strategy().prop_map(|n| format!("https://example.com/{n}.csv")),
    ]
}

fn entity_strategy() -> impl Strategy<Value = Entity> {
    prop_oneof![
        (name_strategy(), attributes_strategy()).prop_map(|(name, attrs)| {
            let mut c = Connection::new(name);
            for (k, v) in attrs {
                c = c.with_attribute(k, v);
            }
            Entity::Connection(c)
        }),
        (name_strategy(), attributes_strategy()).prop_map(|(name, attrs)| {
            let mut m = Model::new(name);
            for (k, v) in attrs {
                m = m.with_attribute(k, v);
            }
            Entity::Model(m)
        }),
        (name_strategy(), source_strategy(), attributes_strategy()).prop_map(
            |(name, source, attrs)| {
                let mut f = Frame::new(name, source);
                for (k, v) in attrs {
                    f = f.with_attribute(k, v);
                }
                Entity::Frame(f)
            }
        ),
    ]
}

fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec(entity_strategy(), 0..12).prop_map(|entities| entities.into_iter().collect())
}

proptest! {
    #[test]
    fn resolve_is_deterministic(doc in document_strategy()) {
        let known = KnownFiles::new();
        let a = resolve(&known, &doc).unwrap();
        let b = resolve(&known, &doc).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn second_pass_bundles_nothing(doc in document_strategy()) {
        let first = resolve(&KnownFiles::new(), &doc).unwrap();
        let second = resolve(&first.known, &doc).unwrap();
        prop_assert!(second.batch.is_empty());
        prop_assert_eq!(second.known, first.known);
    }

    #[test]
    fn batch_never_contains_known_paths(doc in document_strategy(), split in 0usize..12) {
        // Resolve a prefix first, then the whole document.
        let prefix: Document = doc.entities().iter().take(split).cloned().collect();
        let first = resolve(&KnownFiles::new(), &prefix).unwrap();
        let second = resolve(&first.known, &doc).unwrap();

        let new_paths = second
            .known
            .iter()
            .filter(|(path, _)| !first.known.has(path))
            .count();
        prop_assert_eq!(new_paths, second.batch.len());
        for (path, _) in first.known.iter() {
            prop_assert_eq!(second.known.status(path), first.known.status(path));
        }
    }

    #[test]
    fn every_new_path_is_parsed(doc in document_strategy()) {
        let resolution = resolve(&KnownFiles::new(), &doc).unwrap();
        prop_assert_eq!(resolution.known.count(&FileStatus::Parsed), resolution.batch.len());
    }

    #[test]
    fn identical_content_shares_a_path(
        name in name_strategy(),
        attrs in attributes_strategy(),
        others in prop::collection::vec(entity_strategy(), 0..6),
    ) {
        let mut model = Model::new(name);
        for (k, v) in attrs {
            model = model.with_attribute(k, v);
        }

        // Same model declared first in one document and last in another.
        let mut first: Document = others.iter().cloned().collect();
        first.push(model.clone());
        let second = Document::new().with(model.clone());

        let path_in = |doc: &Document| -> ServerPath {
            let resolution = resolve(&KnownFiles::new(), doc).unwrap();
            let path = resolution
                .mapping
                .iter()
                .find(|(r, _)| r.name == model.name && r.kind == hdio_protocol::EntityKind::Model)
                .map(|(_, p)| p.clone())
                .unwrap();
            path
        };
        prop_assert_eq!(path_in(&first), path_in(&second));
    }
}
