//! Template expansion through the public builder API.

#[cfg(test)]
mod template_properties_tests {
    use serde_json::json;
    use test_case::test_case;

    use datamapper::parameters::Registries;
    use datamapper::template::{Fragment, TagDef, TagName, TemplateBuilder};
    use datamapper::type_handlers::TypeHandlerRegistry;
    use datamapper::types::TypeRegistry;
    use datamapper::Value;

    fn expand(fragments: Vec<Fragment>, parameter: serde_json::Value) -> (String, Vec<String>) {
        let types = TypeRegistry::new();
        let handlers = TypeHandlerRegistry::new();
        let registries = Registries {
            types: &types,
            handlers: &handlers,
        };
        let expanded = TemplateBuilder::new(registries, None)
            .build(&fragments)
            .unwrap()
            .expand(&Value::from(parameter), registries)
            .unwrap();
        let names = expanded
            .parameter_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        (expanded.sql, names)
    }

    fn collapse(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_inline_parameter_without_class() {
        let (sql, names) = expand(vec!["id = #id#".into()], json!({"id": 1}));
        assert_eq!(sql, "id =  ? ");
        assert_eq!(names, vec!["id"]);
    }

    #[test]
    fn test_dynamic_where_drops_first_prepend() {
        let fragments = vec![TagDef::dynamic()
            .prepend("WHERE")
            .child(TagDef::test(TagName::IsNotNull, "name").prepend("AND").child("name = #name#"))
            .child(TagDef::test(TagName::IsNotNull, "age").prepend("AND").child("age = #age#"))
            .into()];
        let (sql, names) = expand(fragments, json!({"age": 30}));
        assert_eq!(collapse(&sql), "WHERE age = ?");
        assert_eq!(names, vec!["age"]);
    }

    #[test]
    fn test_iterate_placeholders() {
        let fragments = vec![TagDef::iterate("ids")
            .open("(")
            .close(")")
            .conjunction(",")
            .child("#ids[]#")
            .into()];
        let (sql, names) = expand(fragments, json!({"ids": [1, 2, 3]}));
        assert_eq!(sql.replace(char::is_whitespace, ""), "(?,?,?)");
        assert_eq!(names, vec!["ids[0]", "ids[1]", "ids[2]"]);
    }

    #[test_case(TagName::IsGreaterEqual, json!(5), true; "greater equal on equal")]
    #[test_case(TagName::IsGreaterEqual, json!(4), false; "greater equal below")]
    #[test_case(TagName::IsGreaterThan, json!(6), true; "greater than above")]
    #[test_case(TagName::IsLessThan, json!(4), true; "less than below")]
    #[test_case(TagName::IsLessEqual, json!(6), false; "less equal above")]
    #[test_case(TagName::IsEqual, json!(5), true; "equal")]
    #[test_case(TagName::IsNotEqual, json!(5), false; "not equal on equal")]
    #[test_case(TagName::IsGreaterEqual, json!(null), false; "greater equal on null")]
    #[test_case(TagName::IsLessThan, json!(null), false; "less than on null")]
    fn test_comparison_against_literal(tag: TagName, n: serde_json::Value, rendered: bool) {
        let fragments = vec![TagDef::test(tag, "n").compare_value("5").child("hit").into()];
        let (sql, _) = expand(fragments, json!({ "n": n }));
        assert_eq!(sql.trim() == "hit", rendered);
    }

    #[test]
    fn test_substitution_is_not_a_parameter() {
        let (sql, names) = expand(
            vec!["select * from t order by $column$".into()],
            json!({"column": "name"}),
        );
        assert_eq!(collapse(&sql), "select * from t order by name");
        assert!(names.is_empty());
    }
}
