//! Property-based tests using proptest
//!
//! These tests verify path construction and lookup, the load/replace
//! contract and collection mapping using randomized inputs.

mod common;

use cloudres::client::StubClient;
use cloudres::resource::{Args, Path, Resolved, Service};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Generate a member name
fn arb_key() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z]{0,11}"
}

/// Generate a writable path of keys and small indexes
fn arb_path() -> impl Strategy<Value = String> {
    (
        arb_key(),
        prop::collection::vec(prop_oneof![arb_key(), (0usize..4).prop_map(|i| i.to_string())], 0..4),
    )
        .prop_map(|(first, rest)| {
            std::iter::once(first)
                .chain(rest)
                .collect::<Vec<_>>()
                .join(".")
        })
}

/// Generate a non-null JSON leaf
fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-z0-9-]{0,16}".prop_map(Value::String),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
    ]
}

/// Generate a flat object of attributes
fn arb_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(arb_key(), arb_leaf(), 0..8)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// A value written at a path reads back unchanged
    #[test]
    fn set_then_get_round_trips(raw in arb_path(), leaf in arb_leaf()) {
        let path = Path::parse(&raw).unwrap();
        let mut root = Value::Null;
        path.set(&mut root, leaf.clone()).unwrap();
        prop_assert_eq!(path.get(&root), Resolved::One(leaf));
    }

    /// Writing one path never disturbs a sibling key
    #[test]
    fn set_keeps_siblings(raw in arb_path(), leaf in arb_leaf(), other in arb_leaf()) {
        let path = Path::parse(&raw).unwrap();
        let mut root = json!({"__sibling": other.clone()});
        path.set(&mut root, leaf).unwrap();
        prop_assert_eq!(&root["__sibling"], &other);
    }

    /// Missing members read as null, never panic
    #[test]
    fn missing_paths_read_null(raw in arb_path(), object in arb_object()) {
        let path = Path::parse(&format!("__missing.{}", raw)).unwrap();
        prop_assert_eq!(path.get(&object), Resolved::One(Value::Null));
    }

    /// Projection yields one value per non-null element
    #[test]
    fn projection_counts_elements(values in prop::collection::vec(prop::option::of(arb_leaf()), 0..20)) {
        let items: Vec<Value> = values
            .iter()
            .map(|v| json!({"Key": v.clone().unwrap_or(Value::Null)}))
            .collect();
        let path = Path::parse("Contents[].Key").unwrap();
        let expected = values.iter().filter(|v| v.is_some()).count();

        match path.get(&json!({"Contents": items})) {
            Resolved::Many(found) => prop_assert_eq!(found.len(), expected),
            Resolved::One(_) => prop_assert!(false, "projection returned a single value"),
        }
    }

    /// Display round-trips through parse
    #[test]
    fn parse_display_round_trip(raw in arb_path()) {
        let path = Path::parse(&raw).unwrap();
        prop_assert_eq!(path.to_string(), raw);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Load then read returns exactly what the response held
    #[test]
    fn load_then_read_matches_response(response in arb_object()) {
        let stub = Arc::new(StubClient::new());
        stub.stub("HeadObject", response.clone());
        let service = Service::new(common::model(), stub);

        let object = service
            .resource("Object", [("BucketName", "b"), ("Key", "k")])
            .unwrap();
        runtime().block_on(object.load()).unwrap();

        prop_assert_eq!(object.data().unwrap(), response);
    }

    /// A second load fully replaces the first
    #[test]
    fn second_load_replaces_first(first in arb_object(), second in arb_object()) {
        let stub = Arc::new(StubClient::new());
        stub.stub_sequence("HeadObject", [first, second.clone()]);
        let service = Service::new(common::model(), stub);

        let object = service
            .resource("Object", [("BucketName", "b"), ("Key", "k")])
            .unwrap();
        let rt = runtime();
        rt.block_on(object.load()).unwrap();
        rt.block_on(object.load()).unwrap();

        prop_assert_eq!(object.data().unwrap(), second);
    }

    /// N listed elements become N instances carrying the parent identifier
    #[test]
    fn collection_yields_one_instance_per_element(keys in prop::collection::vec("[a-z0-9/]{1,12}", 0..25)) {
        let contents: Vec<Value> = keys.iter().map(|k| json!({"Key": k})).collect();
        let stub = Arc::new(StubClient::new());
        stub.stub("ListObjects", json!({"Contents": contents}));
        let service = Service::new(common::model(), stub);

        let bucket = service.resource("Bucket", [("Name", "parent")]).unwrap();
        let objects = runtime()
            .block_on(bucket.call("Objects", Args::new()))
            .unwrap()
            .into_resources()
            .unwrap();

        prop_assert_eq!(objects.len(), keys.len());
        for (object, key) in objects.iter().zip(&keys) {
            prop_assert_eq!(object.identifier("BucketName"), Some(&json!("parent")));
            prop_assert_eq!(object.identifier("Key"), Some(&json!(key)));
        }
    }
}
