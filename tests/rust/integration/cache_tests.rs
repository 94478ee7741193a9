//! Statement caches seen through the mapper.

use serde_json::json;

use datamapper::cache::CacheModelDef;
use datamapper::config::MapperSettings;
use datamapper::driver::memory::{Response, ResultSet};
use datamapper::results::{ResultMapDef, ResultPropertyDef};
use datamapper::statement::{StatementDef, StatementKind};
use datamapper::{ConfigurationBuilder, Value};

use super::common::{builder, builder_with, mapper, prop};

fn cached(mut b: ConfigurationBuilder, cache: CacheModelDef) -> ConfigurationBuilder {
    b.add_cache_model(cache)
        .add_result_map(
            ResultMapDef::new("account", "Account")
                .result(ResultPropertyDef::new("id").column("ACC_ID"))
                .result(ResultPropertyDef::new("name").column("ACC_NAME")),
        )
        .add_statement(
            StatementDef::select("byName", "select ACC_ID, ACC_NAME from accounts where ACC_NAME = #value#")
                .result_map("account")
                .cache_model("accounts"),
        )
        .add_statement(
            StatementDef::new("rename", StatementKind::Update)
                .text("update accounts set ACC_NAME = #name# where ACC_ID = #id#"),
        );
    b
}

fn script(db: &datamapper::driver::memory::MemoryDataSource) {
    db.on(
        "from accounts",
        Response::rows(ResultSet::new(&["ACC_ID", "ACC_NAME"]).with_json_rows(json!([[1, "alice"]]))),
    );
    db.on("update accounts", Response::Affected(1));
}

#[test]
fn test_repeated_query_served_from_cache() {
    let (mapper, db) = mapper(cached(builder(), CacheModelDef::new("accounts")));
    script(&db);

    let first = mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    let second = mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    assert_eq!(db.execution_count("from accounts"), 1);
    // Read-only caches hand out the cached instances.
    assert!(first[0].as_object().unwrap().ptr_eq(second[0].as_object().unwrap()));

    mapper.query_for_list("byName", &Value::from("bob")).unwrap();
    assert_eq!(db.execution_count("from accounts"), 2);

    let stats = mapper.cache_stats("accounts").unwrap();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 2);
}

#[test]
fn test_writable_cache_returns_copies() {
    let (mapper, db) = mapper(cached(builder(), CacheModelDef::new("accounts").read_only(false)));
    script(&db);

    let first = mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    first[0].as_object().unwrap().set("name", Value::from("changed")).unwrap();
    let second = mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    assert_eq!(db.execution_count("from accounts"), 1);
    assert_eq!(prop(&second[0], "name"), Value::from("alice"));
}

#[test]
fn test_flush_on_execute() {
    let (mapper, db) = mapper(cached(
        builder(),
        CacheModelDef::new("accounts").flush_on_execute("rename"),
    ));
    script(&db);

    mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    let affected = mapper
        .update("rename", &Value::from(json!({"id": 1, "name": "alicia"})))
        .unwrap();
    assert_eq!(affected, 1);
    mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    assert_eq!(db.execution_count("from accounts"), 2);
}

#[test]
fn test_explicit_flush() {
    let (mapper, db) = mapper(cached(builder(), CacheModelDef::new("accounts")));
    script(&db);

    mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    assert!(mapper.flush_cache("accounts"));
    assert!(!mapper.flush_cache("nope"));
    mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    mapper.flush_all_caches();
    mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    assert_eq!(db.execution_count("from accounts"), 3);
}

#[test]
fn test_caches_disabled_globally() {
    let settings = MapperSettings {
        cache_models_enabled: false,
        ..Default::default()
    };
    let (mapper, db) = mapper(cached(builder_with(settings), CacheModelDef::new("accounts")));
    script(&db);

    mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    mapper.query_for_list("byName", &Value::from("alice")).unwrap();
    assert_eq!(db.execution_count("from accounts"), 2);
    assert_eq!(mapper.cache_stats("accounts").unwrap().requests, 0);
}

#[test]
fn test_result_loaded_before_a_flush_is_not_stored() {
    let mut b = builder();
    b.add_cache_model(CacheModelDef::new("accounts").flush_on_execute("ordersByAccount"))
        .add_result_map(
            ResultMapDef::new("account", "Account")
                .result(ResultPropertyDef::new("id").column("ACC_ID"))
                .result(ResultPropertyDef::new("orders").column("ACC_ID").select("ordersByAccount")),
        )
        .add_result_map(ResultMapDef::new("order", "Order").result(ResultPropertyDef::new("id").column("ORD_ID")))
        .add_statement(
            StatementDef::select("accounts", "select ACC_ID from accounts")
                .result_map("account")
                .cache_model("accounts"),
        )
        .add_statement(
            StatementDef::select("ordersByAccount", "select ORD_ID from orders where ACC_ID = #value#")
                .result_map("order"),
        );
    let (mapper, db) = mapper(b);
    db.on("from accounts", Response::rows(ResultSet::new(&["ACC_ID"]).with_json_rows(json!([[1]]))));
    db.on("from orders", Response::rows(ResultSet::new(&["ORD_ID"]).with_json_rows(json!([[10]]))));

    // the eager sub-select flushes the model while the accounts are loading
    let first = mapper.query_for_list("accounts", &Value::Null).unwrap();
    assert_eq!(prop(&first[0], "orders").collection_len(), Some(1));
    assert_eq!(mapper.cache_stats("accounts").unwrap().size, 0);

    mapper.query_for_list("accounts", &Value::Null).unwrap();
    assert_eq!(db.execution_count("from accounts"), 2);
}
