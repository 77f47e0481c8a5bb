use jsi::{Child, Jsi, JsiOptions, Registry, Schema, SchemaOptions, Value};
use serde_json::json;

fn person() -> Jsi {
    let schema = Schema::new(
        json!({"properties": {"foo": {"type": "object"}, "bar": {"items": {"type": "integer"}}}}),
        &Registry::new(),
        SchemaOptions::default(),
    )
    .unwrap();
    schema
        .new_jsi(json!({"foo": {"a": 1}, "bar": [1, 2]}), JsiOptions::default())
        .unwrap()
}

fn child(parent: &Jsi, key: &str) -> Jsi {
    parent.get(key).unwrap().and_then(Child::into_jsi).unwrap()
}

#[test]
fn test_set_is_visible_through_every_wrapper() {
    let root = person();
    let foo = child(&root, "foo");
    let again = child(&root, "foo");

    foo.set("a", Value::from(2i64)).unwrap();

    assert_eq!(root.to_json().unwrap(), json!({"foo": {"a": 2}, "bar": [1, 2]}));
    assert_eq!(again.to_json().unwrap(), json!({"a": 2}));
    assert_eq!(child(&root, "foo").to_json().unwrap(), json!({"a": 2}));
}

#[test]
fn test_set_appends_but_never_skips_positions() {
    let root = person();
    let bar = child(&root, "bar");
    bar.set(2, Value::from("three")).unwrap();
    assert_eq!(bar.to_json().unwrap(), json!([1, 2, "three"]));
    assert!(!root.is_valid().unwrap());

    assert!(bar.set(5, Value::from(4i64)).is_err());
    assert_eq!(bar.to_json().unwrap(), json!([1, 2, "three"]));
}

#[test]
fn test_modified_copy_leaves_the_original_alone() {
    let root = person();
    let foo = child(&root, "foo");

    let copy = foo
        .modified_copy(|mut value| {
            if let Some(members) = value.make_object_mut() {
                members.insert("b".to_string(), Value::from(2i64));
            }
            value
        })
        .unwrap();

    assert_eq!(copy.to_json().unwrap(), json!({"a": 1, "b": 2}));
    assert_eq!(copy.ptr().pointer(), "/foo");
    let described: Vec<String> = copy.schemas().iter().map(|s| s.ptr().pointer()).collect();
    assert_eq!(described, ["/properties/foo"]);

    assert_eq!(foo.to_json().unwrap(), json!({"a": 1}));
    assert_eq!(root.to_json().unwrap(), json!({"foo": {"a": 1}, "bar": [1, 2]}));
    assert!(!copy.document().same(root.document()));

    let copied_root = copy.parent_jsi().unwrap().unwrap();
    assert_eq!(
        copied_root.to_json().unwrap(),
        json!({"foo": {"a": 1, "b": 2}, "bar": [1, 2]})
    );
}

#[test]
fn test_modified_copy_shares_untouched_subtrees() {
    let root = person();
    let foo = child(&root, "foo");
    let copy = foo.modified_copy(|_| Value::from(json!({"replaced": true}))).unwrap();

    let before = root.document().root();
    let after = copy.document().root();
    assert!(!before.ptr_eq(&after));
    assert!(before.get("bar").unwrap().ptr_eq(after.get("bar").unwrap()));
    assert!(!before.get("foo").unwrap().ptr_eq(after.get("foo").unwrap()));
}

#[test]
fn test_copy_reapplies_schemas_to_the_new_content() {
    let schema = Schema::new(
        json!({
            "properties": {
                "shape": {
                    "oneOf": [
                        {"required": ["radius"], "title": "circle"},
                        {"required": ["width"], "title": "square"}
                    ]
                }
            }
        }),
        &Registry::new(),
        SchemaOptions::default(),
    )
    .unwrap();
    let root = schema
        .new_jsi(json!({"shape": {"radius": 1}}), JsiOptions::default())
        .unwrap();
    let shape = child(&root, "shape");
    let titles = |jsi: &Jsi| -> Vec<String> { jsi.schemas().iter().map(|s| s.ptr().pointer()).collect() };
    assert_eq!(titles(&shape), ["/properties/shape", "/properties/shape/oneOf/0"]);

    let square = shape.modified_copy(|_| Value::from(json!({"width": 2}))).unwrap();
    assert_eq!(titles(&square), ["/properties/shape", "/properties/shape/oneOf/1"]);
    assert_eq!(titles(&shape), ["/properties/shape", "/properties/shape/oneOf/0"]);
}
