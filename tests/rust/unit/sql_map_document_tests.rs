//! Mapping documents written in YAML and compiled into statements.

#[cfg(test)]
mod sql_map_document_tests {
    use serde_json::json;

    use datamapper::config::MapperSettings;
    use datamapper::statement::StatementKind;
    use datamapper::types::{ClassDef, ScalarType};
    use datamapper::{ConfigurationBuilder, ConfigurationError, SqlMapDef, Value};

    const ACCOUNT_MAP: &str = r##"
namespace: Account
cacheModels:
  - id: byName
    implementation: fifo
    size: 10
    flushOnExecute: [update]
resultMaps:
  - id: account
    class: Account
    results:
      - property: id
        column: ACC_ID
      - property: name
        column: ACC_NAME
statements:
  - id: search
    kind: select
    resultMaps: [account]
    cacheModel: byName
    body:
      - text: "select ACC_ID, ACC_NAME from accounts"
      - tag:
          name: dynamic
          prepend: WHERE
          children:
            - tag:
                name: isNotNull
                property: name
                prepend: AND
                children:
                  - text: "ACC_NAME = #name#"
            - tag:
                name: isNotEmpty
                property: ids
                prepend: AND
                children:
                  - text: "ACC_ID in"
                  - tag:
                      name: iterate
                      property: ids
                      open: "("
                      close: ")"
                      conjunction: ","
                      children:
                        - text: "#ids[]#"
  - id: update
    kind: update
    parameterClass: Account
    body:
      - text: "update accounts set ACC_NAME = #name# where ACC_ID = #id#"
"##;

    fn compile(document: &str) -> Result<datamapper::Configuration, ConfigurationError> {
        let mut builder = ConfigurationBuilder::new(MapperSettings {
            use_statement_namespaces: true,
            ..Default::default()
        });
        builder.register_class(
            ClassDef::new("Account")
                .scalar("id", ScalarType::Int)
                .scalar("name", ScalarType::Text),
        )?;
        builder.add_sql_map(SqlMapDef::from_yaml_str(document)?);
        builder.build()
    }

    #[test]
    fn test_document_compiles_with_qualified_ids() {
        let config = compile(ACCOUNT_MAP).unwrap();
        assert_eq!(config.statement_ids(), vec!["Account.search", "Account.update"]);

        let search = config.statement("Account.search").unwrap();
        assert_eq!(search.kind(), StatementKind::Select);
        assert!(search.template().is_dynamic());
        assert_eq!(search.cache_model().unwrap().id(), "Account.byName");
        assert_eq!(config.flush_triggers("Account.update").len(), 1);
    }

    #[test]
    fn test_document_statement_expands() {
        let config = compile(ACCOUNT_MAP).unwrap();
        let search = config.statement("Account.search").unwrap();
        let expanded = search
            .expand(&Value::from(json!({"ids": [4, 5]})), config.registries())
            .unwrap();
        let sql = expanded.sql.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(
            sql.replace(' ', ""),
            "selectACC_ID,ACC_NAMEfromaccountsWHEREACC_IDin(?,?)"
        );
        assert_eq!(expanded.parameter_names(), vec!["ids[0]", "ids[1]"]);
    }

    #[test]
    fn test_typed_parameter_class_rejects_unknown_property() {
        let document = r#"
statements:
  - id: bad
    kind: update
    parameterClass: Account
    body:
      - text: "update accounts set x = #nickname#"
"#;
        assert!(matches!(
            compile(document),
            Err(ConfigurationError::Template { .. })
        ));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            SqlMapDef::from_yaml_str("statements: 3"),
            Err(ConfigurationError::Invalid { .. })
        ));
    }
}
