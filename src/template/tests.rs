use serde_json::json;

use super::*;
use crate::type_handlers::TypeHandlerRegistry;
use crate::types::{ClassDef, PropertyType, ScalarType, TypeRegistry};

struct Fixture {
    types: TypeRegistry,
    handlers: TypeHandlerRegistry,
}

impl Fixture {
    fn new() -> Self {
        let mut types = TypeRegistry::new();
        types
            .register_class(
                ClassDef::new("Account")
                    .scalar("id", ScalarType::Int)
                    .scalar("name", ScalarType::Text)
                    .property("ids", PropertyType::list_of(PropertyType::Scalar(ScalarType::Int))),
            )
            .unwrap();
        Fixture {
            types,
            handlers: TypeHandlerRegistry::new(),
        }
    }

    fn registries(&self) -> Registries<'_> {
        Registries {
            types: &self.types,
            handlers: &self.handlers,
        }
    }

    fn build(&self, fragments: Vec<Fragment>) -> Result<TemplateTree, TemplateError> {
        TemplateBuilder::new(self.registries(), None).build(&fragments)
    }

    fn expand(&self, fragments: Vec<Fragment>, parameter: serde_json::Value) -> Expanded {
        self.build(fragments)
            .unwrap()
            .expand(&Value::from(parameter), self.registries())
            .unwrap()
    }
}

fn collapse(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn squash(sql: &str) -> String {
    sql.chars().filter(|c| !c.is_whitespace()).collect()
}

fn where_name_age() -> Vec<Fragment> {
    vec![
        "select * from accounts".into(),
        TagDef::dynamic()
            .prepend("WHERE")
            .child(
                TagDef::test(TagName::IsNotNull, "name")
                    .prepend("AND")
                    .child("name = #name#"),
            )
            .child(
                TagDef::test(TagName::IsNotNull, "age")
                    .prepend("AND")
                    .child("age = #age#"),
            )
            .into(),
    ]
}

#[test]
fn test_static_text_keeps_placeholder_spacing() {
    let fx = Fixture::new();
    let expanded = fx.expand(vec!["id = #id#".into()], json!({"id": 3}));
    assert_eq!(expanded.sql, "id =  ? ");
    assert_eq!(expanded.parameter_names(), vec!["id"]);
}

#[test]
fn test_first_prepend_suppressed_inside_dynamic() {
    let fx = Fixture::new();
    let expanded = fx.expand(where_name_age(), json!({"name": null, "age": 30}));
    assert_eq!(collapse(&expanded.sql), "select * from accounts WHERE age = ?");
    assert_eq!(expanded.parameter_names(), vec!["age"]);
}

#[test]
fn test_following_prepends_kept() {
    let fx = Fixture::new();
    let expanded = fx.expand(where_name_age(), json!({"name": "ann", "age": 30}));
    assert_eq!(
        collapse(&expanded.sql),
        "select * from accounts WHERE name = ? AND age = ?"
    );
    assert_eq!(expanded.parameter_names(), vec!["name", "age"]);
}

#[test]
fn test_dynamic_with_empty_body_emits_nothing() {
    let fx = Fixture::new();
    let expanded = fx.expand(where_name_age(), json!({}));
    assert_eq!(collapse(&expanded.sql), "select * from accounts");
    assert!(expanded.parameters.is_empty());
}

#[test]
fn test_empty_prepended_body_rearms_override() {
    let fx = Fixture::new();
    let fragments = vec![TagDef::dynamic()
        .prepend("WHERE")
        .child(
            TagDef::test(TagName::IsNotEmpty, "name")
                .prepend("AND")
                .child(TagDef::test(TagName::IsNotNull, "nickname").child("nick = #nickname#")),
        )
        .child(
            TagDef::test(TagName::IsNotNull, "age")
                .prepend("AND")
                .child("age = #age#"),
        )
        .into()];
    let expanded = fx.expand(fragments, json!({"name": "ann", "age": 5}));
    assert_eq!(collapse(&expanded.sql), "WHERE age = ?");
}

fn nested_dynamic() -> Vec<Fragment> {
    vec![TagDef::dynamic()
        .prepend("WHERE")
        .child(
            TagDef::test(TagName::IsNotNull, "a")
                .prepend("AND")
                .child("a = #a#"),
        )
        .child(
            TagDef::dynamic().prepend("OR").child(
                TagDef::test(TagName::IsNotNull, "b")
                    .prepend("AND")
                    .child("b = #b#"),
            ),
        )
        .into()]
}

#[test]
fn test_nested_dynamic_prepend_joins_blocks() {
    let fx = Fixture::new();
    let expanded = fx.expand(nested_dynamic(), json!({"a": 1, "b": 2}));
    assert_eq!(collapse(&expanded.sql), "WHERE a = ? OR b = ?");
}

#[test]
fn test_nested_dynamic_prepend_kept_when_first() {
    // The inner block's prepend survives even when the block renders first.
    let fx = Fixture::new();
    let expanded = fx.expand(nested_dynamic(), json!({"a": null, "b": 2}));
    assert_eq!(collapse(&expanded.sql), "WHERE OR b = ?");
}

#[test]
fn test_sibling_dynamic_blocks_each_suppress_their_first_prepend() {
    let fx = Fixture::new();
    let fragments = vec![
        TagDef::dynamic()
            .prepend("WHERE")
            .child(TagDef::test(TagName::IsNotNull, "a").prepend("AND").child("a = #a#"))
            .into(),
        TagDef::dynamic()
            .prepend("ORDER BY")
            .child(TagDef::test(TagName::IsNotNull, "sort").prepend(",").child("$sort$"))
            .child(TagDef::test(TagName::IsNotNull, "then").prepend(",").child("$then$"))
            .into(),
    ];
    let expanded = fx.expand(fragments, json!({"a": 1, "sort": "name", "then": "id"}));
    assert_eq!(collapse(&expanded.sql), "WHERE a = ? ORDER BY name , id");
}

#[test]
fn test_iterate_expansion() {
    let fx = Fixture::new();
    let fragments = vec![TagDef::iterate("ids")
        .open("(")
        .close(")")
        .conjunction(",")
        .child("#ids[]#")
        .into()];
    let expanded = fx.expand(fragments, json!({"ids": [1, 2, 3]}));
    assert_eq!(squash(&expanded.sql), "(?,?,?)");
    assert_eq!(expanded.parameter_names(), vec!["ids[0]", "ids[1]", "ids[2]"]);
}

#[test]
fn test_iterate_prepend_once_and_suppressed_as_first() {
    let fx = Fixture::new();
    let fragments = vec![
        "select * from t".into(),
        TagDef::dynamic()
            .prepend("WHERE")
            .child(
                TagDef::iterate("ids")
                    .prepend("AND")
                    .open("id IN (")
                    .close(")")
                    .conjunction(",")
                    .child("#ids[]#"),
            )
            .child(TagDef::test(TagName::IsNotNull, "name").prepend("AND").child("name = #name#"))
            .into(),
    ];
    let expanded = fx.expand(fragments, json!({"ids": [7, 8], "name": "x"}));
    assert_eq!(
        squash(&expanded.sql),
        "select*fromtWHEREidIN(?,?)ANDname=?"
    );
    assert_eq!(expanded.parameter_names(), vec!["ids[0]", "ids[1]", "name"]);
}

#[test]
fn test_iterate_empty_or_null_renders_nothing() {
    let fx = Fixture::new();
    let fragments = || {
        vec![TagDef::iterate("ids")
            .open("(")
            .close(")")
            .conjunction(",")
            .child("#ids[]#")
            .into()]
    };
    assert_eq!(fx.expand(fragments(), json!({"ids": []})).sql.trim(), "");
    assert_eq!(fx.expand(fragments(), json!({"ids": null})).sql.trim(), "");
}

#[test]
fn test_iterate_over_parameter_list() {
    let fx = Fixture::new();
    let fragments = vec![TagDef::new(TagName::Iterate)
        .open("(")
        .close(")")
        .conjunction(",")
        .child("#[]#")
        .into()];
    let expanded = fx.expand(fragments, json!([4, 5]));
    assert_eq!(squash(&expanded.sql), "(?,?)");
    assert_eq!(expanded.parameter_names(), vec!["[0]", "[1]"]);
}

#[test]
fn test_nested_iterate_resolves_enclosing_index() {
    let fx = Fixture::new();
    let fragments = vec![TagDef::iterate("orders")
        .conjunction(";")
        .child(
            TagDef::iterate("orders[].lines")
                .conjunction(",")
                .child("#orders[].lines[].sku#"),
        )
        .into()];
    let expanded = fx.expand(
        fragments,
        json!({"orders": [
            {"lines": [{"sku": "a"}, {"sku": "b"}]},
            {"lines": [{"sku": "c"}]}
        ]}),
    );
    assert_eq!(squash(&expanded.sql), "?,?;?");
    assert_eq!(
        expanded.parameter_names(),
        vec![
            "orders[0].lines[0].sku",
            "orders[0].lines[1].sku",
            "orders[1].lines[0].sku"
        ]
    );
}

#[test]
fn test_conditional_inside_iterate_uses_current_element() {
    let fx = Fixture::new();
    let fragments = vec![TagDef::iterate("ids")
        .child(
            TagDef::test(TagName::IsEqual, "ids[]")
                .compare_value("2")
                .child("#ids[]#"),
        )
        .into()];
    let expanded = fx.expand(fragments, json!({"ids": [1, 2, 3]}));
    assert_eq!(expanded.parameter_names(), vec!["ids[1]"]);
}

#[test]
fn test_substitution_inside_iterate() {
    let fx = Fixture::new();
    let fragments = vec![
        "select".into(),
        TagDef::iterate("columns").conjunction(",").child("$columns[]$").into(),
        "from t".into(),
    ];
    let expanded = fx.expand(fragments, json!({"columns": ["a", "b"]}));
    assert_eq!(collapse(&expanded.sql), "select a, b from t");
}

#[test]
fn test_is_greater_equal_against_literal() {
    let fx = Fixture::new();
    let fragments = || {
        vec![TagDef::test(TagName::IsGreaterEqual, "n")
            .compare_value("5")
            .child("big")
            .into()]
    };
    assert_eq!(fx.expand(fragments(), json!({"n": 5})).sql.trim(), "big");
    assert_eq!(fx.expand(fragments(), json!({"n": 4})).sql.trim(), "");
    assert_eq!(fx.expand(fragments(), json!({"n": null})).sql.trim(), "");
}

#[test]
fn test_null_property_satisfies_only_null_forms() {
    let fx = Fixture::new();
    for name in [
        TagName::IsEqual,
        TagName::IsGreaterThan,
        TagName::IsGreaterEqual,
        TagName::IsLessThan,
        TagName::IsLessEqual,
    ] {
        let fragments = vec![TagDef::test(name, "n").compare_value("5").child("x").into()];
        assert_eq!(fx.expand(fragments, json!({"n": null})).sql.trim(), "", "{:?}", name);
    }
    let fragments = vec![TagDef::test(TagName::IsNull, "n").child("x").into()];
    assert_eq!(fx.expand(fragments, json!({"n": null})).sql.trim(), "x");
}

#[test]
fn test_compare_property() {
    let fx = Fixture::new();
    let fragments = || {
        vec![TagDef::test(TagName::IsLessThan, "low")
            .compare_property("high")
            .child("ok")
            .into()]
    };
    assert_eq!(fx.expand(fragments(), json!({"low": 1, "high": 2})).sql.trim(), "ok");
    assert_eq!(fx.expand(fragments(), json!({"low": 3, "high": 2})).sql.trim(), "");
}

#[test]
fn test_parameter_present_and_property_available() {
    let fx = Fixture::new();
    let present = || {
        vec![TagDef::new(TagName::IsParameterPresent).child("p").into()]
    };
    assert_eq!(fx.expand(present(), json!(null)).sql.trim(), "");
    assert_eq!(fx.expand(present(), json!({})).sql.trim(), "p");

    let available = || {
        vec![TagDef::test(TagName::IsPropertyAvailable, "flag").child("a").into()]
    };
    assert_eq!(fx.expand(available(), json!({"flag": null})).sql.trim(), "a");
    assert_eq!(fx.expand(available(), json!({})).sql.trim(), "");
}

#[test]
fn test_is_empty_on_whole_parameter() {
    let fx = Fixture::new();
    let fragments = vec![TagDef::new(TagName::IsEmpty).child("none").into()];
    assert_eq!(fx.expand(fragments.clone(), json!([])).sql.trim(), "none");
    assert_eq!(fx.expand(fragments, json!([1])).sql.trim(), "");
}

#[test]
fn test_literal_hash_and_dollar() {
    let fx = Fixture::new();
    let expanded = fx.expand(vec!["select '##', '$$' from t where id = #id#".into()], json!({"id": 1}));
    assert_eq!(expanded.sql, "select '#', '$' from t where id =  ? ");
}

#[test]
fn test_build_errors() {
    let fx = Fixture::new();
    assert!(matches!(
        fx.build(vec!["id = #id".into()]),
        Err(TemplateError::InlineParameter(_))
    ));
    assert!(matches!(
        fx.build(vec![TagDef::iterate("ids").child("#ids[],colour=red#").into()]),
        Err(TemplateError::InlineParameter(_))
    ));
    assert!(matches!(
        fx.build(vec![TagDef::test(TagName::IsEqual, "a").child("x").into()]),
        Err(TemplateError::MissingCompareTarget { tag: "isEqual" })
    ));
    assert!(matches!(
        fx.build(vec![TagDef::test(TagName::IsNull, "a..b").into()]),
        Err(TemplateError::InvalidAttribute { .. })
    ));
    assert!(matches!(
        fx.build(vec!["from $table".into()]),
        Err(TemplateError::Substitution(_))
    ));
}

#[test]
fn test_typed_parameter_class_checks_properties() {
    let fx = Fixture::new();
    let account = fx.types.resolve("Account").unwrap();
    let tree = TemplateBuilder::new(fx.registries(), Some(account.clone()))
        .build(&["id = #id#".into()])
        .unwrap();
    let expanded = tree
        .expand(&Value::from(json!({"id": 9})), fx.registries())
        .unwrap();
    assert_eq!(expanded.parameters[0].handler().name(), "int");
    let err = TemplateBuilder::new(fx.registries(), Some(account))
        .build(&["email = #email#".into()]);
    assert!(matches!(err, Err(TemplateError::Resolution(_))));
}

#[test]
fn test_iterate_over_scalar_is_an_expansion_error() {
    let fx = Fixture::new();
    let tree = fx
        .build(vec![TagDef::iterate("ids").child("#ids[]#").into()])
        .unwrap();
    let err = tree
        .expand(&Value::from(json!({"ids": 5})), fx.registries())
        .unwrap_err();
    assert!(matches!(err, TemplateError::NotACollection { kind: "int", .. }));
}

#[test]
fn test_without_inline_parameters_keeps_text() {
    let fx = Fixture::new();
    let tree = TemplateBuilder::new(fx.registries(), None)
        .without_inline_parameters()
        .build(&["select '#x#' from t where id = ?".into()])
        .unwrap();
    let expanded = tree.expand(&Value::Null, fx.registries()).unwrap();
    assert_eq!(expanded.sql, "select '#x#' from t where id = ?");
    assert!(expanded.parameters.is_empty());
}
