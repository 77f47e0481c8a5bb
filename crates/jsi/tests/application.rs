use jsi::{Child, Draft, Jsi, JsiOptions, Registry, Schema, SchemaOptions, Token, Value};
use serde_json::json;

fn schema(value: serde_json::Value) -> Schema {
    Schema::new(value, &Registry::new(), SchemaOptions::default()).unwrap()
}

fn pointers<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> Vec<String> {
    schemas.into_iter().map(|s| s.ptr().pointer()).collect()
}

fn child_jsi(parent: &Jsi, token: impl Into<Token>) -> Jsi {
    parent.get(token).unwrap().and_then(Child::into_jsi).unwrap()
}

#[test]
fn test_property_child_is_wrapped_with_its_schema() {
    let s = schema(json!({"type": "object", "properties": {"foo": {"type": "object"}}}));
    let root = s.new_jsi(json!({"foo": {"x": "y"}}), JsiOptions::default()).unwrap();
    let foo = child_jsi(&root, "foo");
    assert_eq!(pointers(foo.schemas()), vec!["/properties/foo"]);
    assert_eq!(foo.to_json().unwrap(), json!({"x": "y"}));
}

#[test]
fn test_tuple_items_and_additional_items_through_ref() {
    let s = schema(json!({
        "items": [{"type": "string"}],
        "additionalItems": {"$ref": "#/definitions/a"},
        "definitions": {"a": {}}
    }));
    let instance = Value::from(json!(["x", "y", "z"]));
    let applied = |i: usize| {
        let children = s.child_applicator_schemas(&Token::Index(i), &instance).unwrap();
        let mut inplace = Vec::new();
        for child in &children {
            inplace.extend(child.inplace_applicator_schemas(&instance.get_index(i).cloned().unwrap()).unwrap());
        }
        (pointers(&children), pointers(&inplace))
    };
    assert_eq!(applied(0), (vec!["/items/0".to_string()], vec!["/items/0".to_string()]));
    for i in [1, 2] {
        assert_eq!(
            applied(i),
            (vec!["/additionalItems".to_string()], vec!["/definitions/a".to_string()])
        );
    }

    // the same through a wrapper of a container instance
    let root = s.new_jsi(json!(["x", [], {}]), JsiOptions::default()).unwrap();
    assert_eq!(pointers(child_jsi(&root, 1).schemas()), vec!["/definitions/a"]);
    assert_eq!(pointers(child_jsi(&root, "2").schemas()), vec!["/definitions/a"]);
}

#[test]
fn test_default_is_returned_without_growing_the_instance() {
    let s = schema(json!({"items": {"default": "foo"}}));
    let root = s.new_jsi(json!([1]), JsiOptions::default()).unwrap();
    assert_eq!(root.get(1).unwrap(), Some(Child::Value(Value::from("foo"))));
    assert_eq!(root.len().unwrap(), 1);
    assert_eq!(root.to_json().unwrap(), json!([1]));
}

#[test]
fn test_properties_take_precedence_over_pattern_properties() {
    let s = schema(json!({
        "properties": {"foo": {"title": "exact"}},
        "patternProperties": {"^f": {"title": "pattern"}},
        "additionalProperties": {"title": "rest"}
    }));
    let root = s
        .new_jsi(json!({"foo": {}, "fa": {}, "bar": {}}), JsiOptions::default())
        .unwrap();
    assert_eq!(pointers(child_jsi(&root, "foo").schemas()), vec!["/properties/foo"]);
    assert_eq!(pointers(child_jsi(&root, "fa").schemas()), vec!["/patternProperties/^f"]);
    assert_eq!(pointers(child_jsi(&root, "bar").schemas()), vec!["/additionalProperties"]);
}

#[test]
fn test_one_of_selects_the_validating_branch() {
    let s = schema(json!({
        "oneOf": [
            {"type": "object", "required": ["a"]},
            {"type": "object", "required": ["b"]}
        ]
    }));
    let instance = Value::from(json!({"a": 1}));
    assert_eq!(s.match_to_instance(&instance).unwrap().ptr().pointer(), "/oneOf/0");

    let root = s.new_jsi(json!({"b": 1}), JsiOptions::default()).unwrap();
    assert_eq!(pointers(root.schemas()), vec!["", "/oneOf/1"]);
}

#[test]
fn test_application_does_not_depend_on_validity() {
    let s = schema(json!({
        "allOf": [{"properties": {"n": {"type": "string"}}}],
        "properties": {"n": {"type": "number"}}
    }));
    // "n" fails one of its schemas, both still apply
    let root = s.new_jsi(json!({"n": {}}), JsiOptions::default()).unwrap();
    let n = child_jsi(&root, "n");
    assert_eq!(pointers(n.schemas()), vec!["/properties/n", "/allOf/0/properties/n"]);
    assert!(!n.is_valid().unwrap());
}

#[test]
fn test_contains_is_an_additional_applicator_in_draft07() {
    let value = json!({"items": {"title": "item"}, "contains": {"type": "object"}});
    let instance = json!([{}, 1]);

    let root = schema(value.clone()).new_jsi(instance.clone(), JsiOptions::default()).unwrap();
    assert_eq!(pointers(child_jsi(&root, 0).schemas()), vec!["/items", "/contains"]);

    let draft06 = Schema::new(
        value,
        &Registry::new(),
        SchemaOptions {
            draft: Some(Draft::Draft06),
            ..Default::default()
        },
    )
    .unwrap();
    let root = draft06.new_jsi(instance, JsiOptions::default()).unwrap();
    assert_eq!(pointers(child_jsi(&root, 0).schemas()), vec!["/items"]);
}

#[test]
fn test_conditionals_apply_in_place() {
    let s = schema(json!({
        "if": {"properties": {"kind": {"const": "circle"}}},
        "then": {"properties": {"radius": {"title": "radius"}}},
        "else": {"properties": {"width": {"title": "width"}}}
    }));
    let circle = s.new_jsi(json!({"kind": "circle", "radius": {}}), JsiOptions::default()).unwrap();
    assert_eq!(pointers(circle.schemas()), vec!["", "/then"]);
    assert_eq!(
        pointers(child_jsi(&circle, "radius").schemas()),
        vec!["/then/properties/radius"]
    );

    let square = s.new_jsi(json!({"kind": "square", "width": {}}), JsiOptions::default()).unwrap();
    assert_eq!(pointers(square.schemas()), vec!["", "/else"]);
}

#[test]
fn test_untyped_children_stay_raw() {
    let s = schema(json!({"properties": {"a": {}}}));
    let root = s.new_jsi(json!({"a": 1, "b": {"c": 2}}), JsiOptions::default()).unwrap();
    assert_eq!(root.get("a").unwrap(), Some(Child::Value(Value::from(1i64))));
    assert_eq!(
        root.get("b").unwrap().unwrap().to_json().unwrap(),
        json!({"c": 2})
    );
    assert!(root.get("b").unwrap().unwrap().as_jsi().is_none());
}
