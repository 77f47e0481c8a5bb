use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jsi::{
    Child, Draft, Error, JsiOptions, Node, Ref, Referrer, Registry, Resource, Schema, SchemaOptions,
};
use serde_json::json;
use url::Url;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registered(registry: &Registry, value: serde_json::Value, base: &str) -> Schema {
    registry
        .register_schema_document(
            value,
            SchemaOptions {
                base_uri: Some(Url::parse(base).unwrap()),
                register: true,
                ..Default::default()
            },
        )
        .unwrap()
}

#[test]
fn test_cross_document_reference() {
    init_tracing();
    let registry = Registry::new();
    registered(
        &registry,
        json!({"definitions": {"name": {"type": "string"}}}),
        "http://example.com/common.json",
    );
    let person = registered(
        &registry,
        json!({"properties": {"name": {"$ref": "common.json#/definitions/name"}}}),
        "http://example.com/person.json",
    );

    let name = person
        .subschema(&jsi::Ptr::from_pointer("/properties/name").unwrap())
        .unwrap();
    let target = name.ref_target().unwrap().unwrap();
    assert_eq!(
        target.schema_uri().map(Url::as_str),
        Some("http://example.com/common.json#/definitions/name")
    );

    let instance = person.new_jsi(json!({"name": "x"}), JsiOptions::default()).unwrap();
    assert!(instance.is_valid().unwrap());
    let bad = person.new_jsi(json!({"name": 1}), JsiOptions::default()).unwrap();
    assert!(!bad.is_valid().unwrap());
}

#[test]
fn test_embedded_ids_are_registered() {
    let registry = Registry::new();
    registered(
        &registry,
        json!({
            "$id": "http://example.com/bundle.json",
            "definitions": {
                "item": {"$id": "item.json", "type": "integer"}
            }
        }),
        "http://example.com/ignored.json",
    );
    assert!(registry.is_registered("http://example.com/bundle.json"));
    assert!(registry.is_registered("http://example.com/item.json"));

    let item = registry
        .find("http://example.com/item.json")
        .unwrap()
        .to_schema(&registry)
        .unwrap();
    assert_eq!(item.ptr().pointer(), "/definitions/item");
}

#[test]
fn test_resolution_is_memoized() {
    let registry = Registry::new();
    let root = Schema::new(
        json!({"definitions": {"a": {}}, "$ref": "#/definitions/a"}),
        &registry,
        SchemaOptions::default(),
    )
    .unwrap();
    let reference = Ref::new("#/definitions/a", Some(Referrer::Schema(root)), registry).unwrap();
    let first = reference.resolve().unwrap();
    let second = reference.resolve().unwrap();
    assert!(std::ptr::eq(first, second));
    assert_eq!(first.node().ptr().pointer(), "/definitions/a");
}

#[test]
fn test_ambiguous_anchor_names_every_candidate() {
    let root = Schema::new(
        json!({
            "definitions": {
                "a": {"$id": "#collide"},
                "b": {"$id": "#collide"}
            },
            "$ref": "#collide"
        }),
        &Registry::new(),
        SchemaOptions::default(),
    )
    .unwrap();
    let err = root.ref_target().unwrap_err();
    assert!(err.is_resolution());
    let message = err.to_string();
    assert!(message.contains("#/definitions/a"), "{message}");
    assert!(message.contains("#/definitions/b"), "{message}");
}

#[test]
fn test_unique_anchor_resolves() {
    let root = Schema::new(
        json!({"definitions": {"a": {"$id": "#here", "type": "string"}}, "$ref": "#here"}),
        &Registry::new(),
        SchemaOptions::default(),
    )
    .unwrap();
    assert_eq!(root.ref_target().unwrap().unwrap().ptr().pointer(), "/definitions/a");
}

#[test]
fn test_unknown_resource_lists_known_uris() {
    let registry = Registry::new();
    registered(&registry, json!({}), "http://example.com/known.json");
    let root = registered(
        &registry,
        json!({"$ref": "missing.json"}),
        "http://example.com/root.json",
    );
    let err = root.ref_target().unwrap_err();
    assert!(matches!(err, Error::ResourceNotFound { .. }));
    assert!(err.to_string().contains("http://example.com/known.json"));
}

#[test]
fn test_missing_fragment_is_distinct_from_missing_resource() {
    let root = Schema::new(json!({"$ref": "#/definitions/nope"}), &Registry::new(), SchemaOptions::default())
        .unwrap();
    assert!(matches!(root.ref_target(), Err(Error::FragmentNotFound { .. })));
}

#[test]
fn test_reference_to_non_schema() {
    let root = Schema::new(
        json!({"enum": [1], "$ref": "#/enum/0"}),
        &Registry::new(),
        SchemaOptions::default(),
    )
    .unwrap();
    assert!(matches!(root.ref_target(), Err(Error::NotASchema { .. })));
}

#[test]
fn test_named_schemas_fallback() {
    let root = Schema::new(
        json!({
            "schemas": {
                "Person": {"properties": {"pet": {"$ref": "Pet"}}},
                "Pet": {"properties": {"name": {"type": "string"}}}
            }
        }),
        &Registry::new(),
        SchemaOptions::default(),
    )
    .unwrap();
    let pet_ref = root
        .subschema(&jsi::Ptr::from_pointer("/schemas/Person/properties/pet").unwrap())
        .unwrap();
    assert_eq!(pet_ref.ref_target().unwrap().unwrap().ptr().pointer(), "/schemas/Pet");
}

#[test]
fn test_autoload_runs_once() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry
        .autoload_uri("http://example.com/lazy.json", move |request| {
            counter.fetch_add(1, Ordering::SeqCst);
            let schema = Schema::new(
                json!({"type": "string"}),
                request.registry,
                SchemaOptions {
                    base_uri: Some(request.uri.clone()),
                    ..Default::default()
                },
            )?;
            Ok(Resource::schema(&schema))
        })
        .unwrap();

    let root = registered(
        &registry,
        json!({"items": {"$ref": "lazy.json"}}),
        "http://example.com/root.json",
    );
    for _ in 0..3 {
        registry.find("http://example.com/lazy.json").unwrap();
    }
    let instance = root.new_jsi(json!(["a", 1]), JsiOptions::default()).unwrap();
    assert!(!instance.is_valid().unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_collision_between_documents() {
    let registry = Registry::new();
    registered(&registry, json!({"$id": "http://example.com/s.json", "type": "string"}), "http://example.com/a");
    let err = registry
        .register_schema_document(
            json!({"$id": "http://example.com/s.json", "type": "number"}),
            SchemaOptions {
                register: true,
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Collision { .. }));
}

#[test]
fn test_metaschema_describes_schemas() {
    let registry = Registry::with_metaschemas().unwrap();
    let metaschema = registry
        .find("http://json-schema.org/draft-07/schema#")
        .unwrap()
        .to_schema(&registry)
        .unwrap();
    assert!(metaschema.describes_schema());

    let user_schema = metaschema
        .new_jsi(
            json!({"properties": {"id": {"type": "integer"}}, "additionalProperties": false}),
            JsiOptions::default(),
        )
        .unwrap();
    assert!(user_schema.is_valid().unwrap());
    let as_schema = user_schema.as_schema().unwrap();
    assert_eq!(as_schema.draft(), Draft::Draft07);

    // a boolean subschema is still wrapped, since it is a schema
    let additional = user_schema.get("additionalProperties").unwrap().unwrap();
    let additional = additional.as_jsi().unwrap();
    assert!(additional.as_schema().is_some());

    let id = user_schema
        .get("properties")
        .unwrap()
        .and_then(Child::into_jsi)
        .unwrap()
        .get("id")
        .unwrap()
        .and_then(Child::into_jsi)
        .unwrap();
    let id_schema = id.as_schema().unwrap();
    assert!(id_schema.instance_valid(&jsi::Value::from(3i64)).unwrap());
}

#[test]
fn test_dollar_schema_selects_the_draft() {
    let registry = Registry::with_metaschemas().unwrap();
    let s = Schema::new(
        json!({"$schema": "http://json-schema.org/draft-04/schema#", "type": "integer"}),
        &registry,
        SchemaOptions::default(),
    )
    .unwrap();
    assert_eq!(s.draft(), Draft::Draft04);
    assert!(!s.instance_valid(&jsi::Value::from(1.0)).unwrap());
}

#[test]
fn test_plain_document_reference() {
    let registry = Registry::new();
    let node = Node::root_of(
        json!({"a": {"$ref": "#/b"}, "b": {"c": 1}}),
        Some(Url::parse("http://example.com/doc.json").unwrap()),
    );
    let target = node.child("a").deref(&registry).unwrap();
    assert_eq!(target.ptr().pointer(), "/b");
    assert_eq!(node.child("b").deref(&registry).unwrap(), node.child("b"));
}

#[test]
fn test_instance_reference_into_another_document() {
    let registry = Registry::new();
    registry
        .register(&Resource::document(Node::root_of(
            json!({"item": {"x": 1}}),
            Some(Url::parse("http://example.com/other.json").unwrap()),
        )))
        .unwrap();
    let s = Schema::new(
        json!({"properties": {"link": {"title": "link"}}}),
        &registry,
        SchemaOptions::default(),
    )
    .unwrap();
    let root = s
        .new_jsi(
            json!({"link": {"$ref": "other.json#/item"}}),
            JsiOptions {
                base_uri: Some(Url::parse("http://example.com/data.json").unwrap()),
                ..Default::default()
            },
        )
        .unwrap();
    let link = root.get("link").unwrap().and_then(Child::into_jsi).unwrap();

    let target = link.deref().unwrap();
    assert!(!target.document().same(root.document()));
    assert_eq!(
        target.document().base_uri().map(Url::as_str),
        Some("http://example.com/other.json")
    );
    assert_eq!(target.ptr().pointer(), "/item");
    assert_eq!(target.to_json().unwrap(), json!({"x": 1}));
    let described: Vec<String> = target.schemas().iter().map(|s| s.ptr().pointer()).collect();
    assert_eq!(described, ["/properties/link"]);

    // an absent member is looked up through the reference
    assert_eq!(link.get("x").unwrap(), Some(Child::Value(jsi::Value::from(1i64))));
}
