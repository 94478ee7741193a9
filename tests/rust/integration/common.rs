//! Shared fixtures: an account/order/line domain and an in-memory database.

use std::sync::Arc;

use datamapper::config::MapperSettings;
use datamapper::driver::memory::MemoryDataSource;
use datamapper::types::{ClassDef, PropertyType, ScalarType};
use datamapper::{Configuration, ConfigurationBuilder, SqlMapper, Value};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn builder() -> ConfigurationBuilder {
    builder_with(MapperSettings::default())
}

pub fn builder_with(settings: MapperSettings) -> ConfigurationBuilder {
    init_logging();
    let mut builder = ConfigurationBuilder::new(settings);
    builder
        .register_class(
            ClassDef::new("Account")
                .scalar("id", ScalarType::Int)
                .scalar("name", ScalarType::Text)
                .scalar("email", ScalarType::Text)
                .property("orders", PropertyType::list_of(PropertyType::Class("Order".into()))),
        )
        .unwrap()
        .register_class(
            ClassDef::new("Order")
                .scalar("id", ScalarType::Int)
                .scalar("accountId", ScalarType::Int)
                .property("lines", PropertyType::list_of(PropertyType::Class("Line".into()))),
        )
        .unwrap()
        .register_class(
            ClassDef::new("Line")
                .scalar("sku", ScalarType::Text)
                .scalar("qty", ScalarType::Int),
        )
        .unwrap();
    builder.register_alias("account", "Account");
    builder
}

pub fn mapper(builder: ConfigurationBuilder) -> (Arc<SqlMapper>, Arc<MemoryDataSource>) {
    let db = Arc::new(MemoryDataSource::new("test"));
    let config = builder.build().unwrap();
    (SqlMapper::new(config, db.clone()), db)
}

/// Blank instance of a registered class with the given properties set.
pub fn object(config: &Configuration, class: &str, values: &[(&str, Value)]) -> Value {
    let object = config.registries().types.class(class).unwrap().blank();
    for (name, value) in values {
        object.set(name, value.clone()).unwrap();
    }
    Value::Object(object)
}

pub fn prop(value: &Value, name: &str) -> Value {
    value.as_object().unwrap().get(name).unwrap()
}
