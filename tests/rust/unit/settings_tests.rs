//! Settings files feeding configuration compilation.

#[cfg(test)]
mod settings_tests {
    use std::io::Write;

    use datamapper::cache::{CacheKey, CacheModelDef};
    use datamapper::config::MapperSettings;
    use datamapper::statement::StatementDef;
    use datamapper::{ConfigurationBuilder, ConfigurationError, SqlMapDef, Value};

    fn settings_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_settings_drive_namespaces_and_cache_size() -> anyhow::Result<()> {
        let file = settings_file("use_statement_namespaces: true\ndefault_cache_size: 2\n");
        let settings = MapperSettings::from_yaml_file(file.path())?;

        let mut builder = ConfigurationBuilder::new(settings);
        builder.add_sql_map(
            SqlMapDef::new(Some("Account"))
                .cache_model(CacheModelDef::new("recent"))
                .statement(StatementDef::select("all", "select * from accounts").cache_model("recent")),
        );
        let config = builder.build()?;
        assert!(config.statement("Account.all").is_some());

        let cache = config.cache_model("Account.recent").unwrap();
        for i in 0..3 {
            cache.put(CacheKey::new().with(&Value::Int(i)), &Value::Int(i))?;
        }
        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.evictions, 1);
        Ok(())
    }

    #[test]
    fn test_invalid_settings_rejected_before_build() {
        let file = settings_file("max_sub_select_depth: 0\n");
        assert!(MapperSettings::from_yaml_file(file.path()).is_err());
    }

    #[test]
    fn test_settings_errors_convert_into_configuration_errors() {
        fn load(content: &str) -> Result<MapperSettings, ConfigurationError> {
            Ok(MapperSettings::from_yaml_str(content)?)
        }
        assert!(matches!(
            load("default_cache_size: 0"),
            Err(ConfigurationError::Settings(_))
        ));
        assert!(load("lazy_loading_enabled: false").is_ok());
    }
}
