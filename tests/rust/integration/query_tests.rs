//! Queries end to end: expansion, binding and materialization.

use serde_json::json;

use datamapper::driver::memory::{Response, ResultSet};
use datamapper::results::{ResultMapDef, ResultPropertyDef};
use datamapper::statement::StatementDef;
use datamapper::template::{TagDef, TagName};
use datamapper::{DataMapperError, ExecuteOutcome, Value};

use super::common::{builder, mapper, prop};

fn account_map() -> ResultMapDef {
    ResultMapDef::new("account", "Account")
        .result(ResultPropertyDef::new("id").column("ACC_ID"))
        .result(ResultPropertyDef::new("name").column("ACC_NAME"))
}

#[test]
fn test_query_for_object_binds_inline_parameter() {
    let mut b = builder();
    b.add_result_map(account_map()).add_statement(
        StatementDef::select("getAccount", "select ACC_ID, ACC_NAME from accounts where ACC_ID = #value#")
            .parameter_class("int")
            .result_map("account"),
    );
    let (mapper, db) = mapper(b);
    db.on(
        "from accounts",
        Response::rows(ResultSet::new(&["ACC_ID", "ACC_NAME"]).with_json_rows(json!([[1, "alice"]]))),
    );

    let account = mapper
        .query_for_object("getAccount", &Value::Int(1))
        .unwrap()
        .unwrap();
    assert_eq!(prop(&account, "id"), Value::Int(1));
    assert_eq!(prop(&account, "name"), Value::from("alice"));

    let executed = db.last_executed().unwrap();
    assert_eq!(
        executed.text,
        "select ACC_ID, ACC_NAME from accounts where ACC_ID = ?"
    );
    assert_eq!(executed.values(), vec![Value::Int(1)]);
}

#[test]
fn test_query_for_object_cardinality() {
    let mut b = builder();
    b.add_statement(StatementDef::select("names", "select ACC_NAME from accounts"));
    let (mapper, db) = mapper(b);

    db.on("from accounts", Response::rows(ResultSet::new(&["ACC_NAME"])));
    assert_eq!(mapper.query_for_object("names", &Value::Null).unwrap(), None);

    db.on(
        "from accounts",
        Response::rows(ResultSet::new(&["ACC_NAME"]).with_json_rows(json!([["a"], ["b"]]))),
    );
    let err = mapper.query_for_object("names", &Value::Null).unwrap_err();
    assert!(matches!(err, DataMapperError::TooManyResults { count: 2, .. }));
}

#[test]
fn test_dynamic_where_clause() {
    let mut b = builder();
    b.add_statement(
        StatementDef::select("search", "select ACC_ID from accounts")
            .fragment(
                TagDef::dynamic()
                    .prepend("WHERE")
                    .child(TagDef::test(TagName::IsNotNull, "name").prepend("AND").child("ACC_NAME = #name#"))
                    .child(TagDef::test(TagName::IsNotNull, "email").prepend("AND").child("ACC_EMAIL = #email#")),
            )
            .result_class("int"),
    );
    let (mapper, db) = mapper(b);
    db.on(
        "from accounts",
        Response::rows(ResultSet::new(&["ACC_ID"]).with_json_rows(json!([[3], [4]]))),
    );

    let ids = mapper
        .query_for_list("search", &Value::from(json!({"name": null, "email": "a@x"})))
        .unwrap();
    assert_eq!(ids, vec![Value::Int(3), Value::Int(4)]);
    let executed = db.last_executed().unwrap();
    assert_eq!(executed.text, "select ACC_ID from accounts WHERE ACC_EMAIL = ?");
    assert_eq!(executed.values(), vec![Value::from("a@x")]);
}

#[test]
fn test_iterate_in_clause() {
    let mut b = builder();
    b.add_statement(
        StatementDef::select("byIds", "select ACC_NAME from accounts where ACC_ID in")
            .fragment(TagDef::iterate("ids").open("(").close(")").conjunction(",").child("#ids[]#")),
    );
    let (mapper, db) = mapper(b);
    db.on("from accounts", Response::rows(ResultSet::new(&["ACC_NAME"])));

    mapper
        .query_for_list("byIds", &Value::from(json!({"ids": [1, 2, 3]})))
        .unwrap();
    let executed = db.last_executed().unwrap();
    assert_eq!(executed.text.replace(' ', ""), "selectACC_NAMEfromaccountswhereACC_IDin(?,?,?)");
    assert_eq!(
        executed.values(),
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
}

#[test]
fn test_auto_mapping_and_map_results() {
    let mut b = builder();
    b.add_statement(StatementDef::select("auto", "select ID, NAME from accounts").result_class("account"))
        .add_statement(StatementDef::select("asMap", "select ID, NAME from accounts").result_class("map"));
    let (mapper, db) = mapper(b);
    db.on(
        "from accounts",
        Response::rows(ResultSet::new(&["ID", "NAME"]).with_json_rows(json!([[7, "bob"]]))),
    );

    let accounts = mapper.query_for_list("auto", &Value::Null).unwrap();
    assert_eq!(prop(&accounts[0], "id"), Value::Int(7));
    assert_eq!(prop(&accounts[0], "name"), Value::from("bob"));

    let rows = mapper.query_for_list("asMap", &Value::Null).unwrap();
    let row = rows[0].as_map().unwrap();
    assert_eq!(row.get("ID"), Some(&Value::Int(7)));
    assert_eq!(row.get("NAME"), Some(&Value::from("bob")));
}

#[test]
fn test_group_by_builds_one_object_per_key() {
    let mut b = builder();
    b.add_result_map(
        ResultMapDef::new("order", "Order")
            .group_by("id")
            .result(ResultPropertyDef::new("id").column("ORD_ID"))
            .result(ResultPropertyDef::new("lines").result_map("line")),
    )
    .add_result_map(
        ResultMapDef::new("line", "Line")
            .result(ResultPropertyDef::new("sku").column("SKU"))
            .result(ResultPropertyDef::new("qty").column("QTY")),
    )
    .add_statement(StatementDef::select("orders", "select ORD_ID, SKU, QTY from orders").result_map("order"));
    let (mapper, db) = mapper(b);
    db.on(
        "from orders",
        Response::rows(
            ResultSet::new(&["ORD_ID", "SKU", "QTY"])
                .with_json_rows(json!([[10, "a", 1], [10, "b", 2], [11, "c", 3]])),
        ),
    );

    let orders = mapper.query_for_list("orders", &Value::Null).unwrap();
    assert_eq!(orders.len(), 2);
    let lines = prop(&orders[0], "lines");
    let skus: Vec<Value> = lines
        .as_list()
        .unwrap()
        .iter()
        .map(|line| prop(line, "sku"))
        .collect();
    assert_eq!(skus, vec![Value::from("a"), Value::from("b")]);
    assert_eq!(prop(&orders[1], "lines").collection_len(), Some(1));
}

fn account_with_orders(lazy: bool) -> datamapper::ConfigurationBuilder {
    let mut orders = ResultPropertyDef::new("orders").column("ACC_ID").select("ordersByAccount");
    if lazy {
        orders = orders.lazy();
    }
    let mut b = builder();
    b.add_result_map(account_map().result(orders))
        .add_result_map(
            ResultMapDef::new("order", "Order")
                .result(ResultPropertyDef::new("id").column("ORD_ID"))
                .result(ResultPropertyDef::new("accountId").column("ACC_ID")),
        )
        .add_statement(StatementDef::select("accounts", "select ACC_ID, ACC_NAME from accounts").result_map("account"))
        .add_statement(
            StatementDef::select("ordersByAccount", "select ORD_ID, ACC_ID from orders where ACC_ID = #value#")
                .result_map("order"),
        );
    b
}

fn script_orders(db: &datamapper::driver::memory::MemoryDataSource) {
    db.on(
        "from accounts",
        Response::rows(
            ResultSet::new(&["ACC_ID", "ACC_NAME"]).with_json_rows(json!([[1, "alice"], [2, "bob"], [null, "ghost"]])),
        ),
    );
    db.on_fn("from orders", |cmd| {
        let rows = match cmd.values().first() {
            Some(Value::Int(1)) => json!([[100, 1], [101, 1]]),
            _ => json!([]),
        };
        Response::rows(ResultSet::new(&["ORD_ID", "ACC_ID"]).with_json_rows(rows))
    });
}

#[test]
fn test_eager_sub_select_runs_after_main_rows() {
    let (mapper, db) = mapper(account_with_orders(false));
    script_orders(&db);

    let accounts = mapper.query_for_list("accounts", &Value::Null).unwrap();
    assert_eq!(accounts.len(), 3);
    assert_eq!(prop(&accounts[0], "orders").collection_len(), Some(2));
    assert_eq!(prop(&accounts[1], "orders").collection_len(), Some(0));
    // Null key: no sub-select, property set to null.
    assert_eq!(prop(&accounts[2], "orders"), Value::Null);

    let texts: Vec<String> = db.executed().into_iter().map(|c| c.text).collect();
    assert!(texts[0].contains("from accounts"));
    assert_eq!(db.execution_count("from orders"), 2);
}

#[test]
fn test_lazy_sub_select_loads_on_first_access() {
    let (mapper, db) = mapper(account_with_orders(true));
    script_orders(&db);

    let accounts = mapper.query_for_list("accounts", &Value::Null).unwrap();
    assert_eq!(db.execution_count("from orders"), 0);
    let orders = prop(&accounts[0], "orders");
    assert_eq!(orders.collection_len(), Some(2));
    assert_eq!(db.execution_count("from orders"), 1);
    // Loaded once, then replaced in the object.
    prop(&accounts[0], "orders");
    assert_eq!(db.execution_count("from orders"), 1);
}

#[test]
fn test_multiple_result_sets() {
    let mut b = builder();
    b.add_result_map(account_map())
        .add_result_map(ResultMapDef::new("line", "Line").result(ResultPropertyDef::new("sku").column("SKU")))
        .add_statement(
            StatementDef::select("both", "select * from accounts; select SKU from lines")
                .result_map("account")
                .result_map("line"),
        );
    let (mapper, db) = mapper(b);
    db.on(
        "from accounts",
        Response::Rows(vec![
            ResultSet::new(&["ACC_ID", "ACC_NAME"]).with_json_rows(json!([[1, "a"]])),
            ResultSet::new(&["SKU"]).with_json_rows(json!([["x"], ["y"]])),
        ]),
    );

    let sets = mapper.query_for_list("both", &Value::Null).unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].collection_len(), Some(1));
    assert_eq!(sets[1].collection_len(), Some(2));
}

#[test]
fn test_range_row_handler_and_map() {
    let mut b = builder();
    b.add_result_map(account_map())
        .add_statement(StatementDef::select("all", "select ACC_ID, ACC_NAME from accounts").result_map("account"));
    let (mapper, db) = mapper(b);
    db.on(
        "from accounts",
        Response::rows(
            ResultSet::new(&["ACC_ID", "ACC_NAME"]).with_json_rows(json!([[1, "a"], [2, "b"], [3, "c"]])),
        ),
    );

    let page = mapper.query_for_list_range("all", &Value::Null, 1, 5).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(prop(&page[0], "id"), Value::Int(2));

    let mut names = Vec::new();
    let count = mapper
        .query_with_row_handler("all", &Value::Null, |account| names.push(prop(&account, "name")))
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(names, vec![Value::from("a"), Value::from("b"), Value::from("c")]);

    let by_id = mapper.query_for_map("all", &Value::Null, "id", Some("name")).unwrap();
    assert_eq!(by_id.get("2"), Some(&Value::from("b")));
    assert_eq!(by_id.len(), 3);
}

#[test]
fn test_range_skips_sub_selects_of_rows_outside_the_page() {
    let (mapper, db) = mapper(account_with_orders(false));
    script_orders(&db);

    let page = mapper.query_for_list_range("accounts", &Value::Null, 1, 1).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(prop(&page[0], "id"), Value::Int(2));
    assert_eq!(prop(&page[0], "orders").collection_len(), Some(0));
    // only bob's orders were loaded
    assert_eq!(db.execution_count("from orders"), 1);
    assert_eq!(db.last_executed().unwrap().values(), vec![Value::Int(2)]);
}

#[test]
fn test_range_over_grouped_rows_counts_objects() {
    let mut b = builder();
    b.add_result_map(
        ResultMapDef::new("order", "Order")
            .group_by("id")
            .result(ResultPropertyDef::new("id").column("ORD_ID"))
            .result(ResultPropertyDef::new("lines").result_map("line")),
    )
    .add_result_map(ResultMapDef::new("line", "Line").result(ResultPropertyDef::new("sku").column("SKU")))
    .add_statement(StatementDef::select("orders", "select ORD_ID, SKU from orders").result_map("order"));
    let (mapper, db) = mapper(b);
    db.on(
        "from orders",
        Response::rows(
            ResultSet::new(&["ORD_ID", "SKU"]).with_json_rows(json!([[10, "a"], [10, "b"], [11, "c"], [12, "d"]])),
        ),
    );

    let page = mapper.query_for_list_range("orders", &Value::Null, 1, 1).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(prop(&page[0], "id"), Value::Int(11));
    assert_eq!(prop(&page[0], "lines").collection_len(), Some(1));
}

#[test]
fn test_query_for_object_into_fills_existing() {
    let mut b = builder();
    b.add_result_map(account_map())
        .add_statement(StatementDef::select("one", "select ACC_ID, ACC_NAME from accounts").result_map("account"));
    let (mapper, db) = mapper(b);
    db.on(
        "from accounts",
        Response::rows(ResultSet::new(&["ACC_ID", "ACC_NAME"]).with_json_rows(json!([[5, "eve"]]))),
    );

    let target = super::common::object(mapper.configuration(), "Account", &[("email", Value::from("e@x"))]);
    let filled = mapper
        .query_for_object_into("one", &Value::Null, &target)
        .unwrap()
        .unwrap();
    assert!(filled.as_object().unwrap().ptr_eq(target.as_object().unwrap()));
    assert_eq!(prop(&target, "name"), Value::from("eve"));
    assert_eq!(prop(&target, "email"), Value::from("e@x"));
}

#[test]
fn test_execute_and_statement_errors() {
    let mut b = builder();
    b.add_statement(StatementDef::select("count", "select count(*) from accounts"));
    let (mapper, db) = mapper(b);
    db.on("count(*)", Response::rows(ResultSet::new(&["C"]).with_json_rows(json!([[4]]))));

    assert_eq!(
        mapper.execute("count", &Value::Null).unwrap(),
        ExecuteOutcome::Rows(vec![Value::Int(4)])
    );
    assert!(matches!(
        mapper.query_for_list("missing", &Value::Null),
        Err(DataMapperError::StatementNotFound(_))
    ));
    assert!(matches!(
        mapper.update("count", &Value::Null),
        Err(DataMapperError::WrongStatementKind { .. })
    ));

    db.on("count(*)", Response::Fail("disk on fire".into()));
    let err = mapper.query_for_list("count", &Value::Null).unwrap_err();
    assert!(matches!(err, DataMapperError::Driver { ref statement, .. } if statement == "count"));
}

#[test]
fn test_missing_column_reports_row() {
    let mut b = builder();
    b.add_result_map(account_map())
        .add_statement(StatementDef::select("bad", "select ACC_ID from accounts").result_map("account"));
    let (mapper, db) = mapper(b);
    db.on(
        "from accounts",
        Response::rows(ResultSet::new(&["ACC_ID"]).with_json_rows(json!([[1]]))),
    );

    let err = mapper.query_for_list("bad", &Value::Null).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("ACC_NAME"), "{}", message);
    assert!(message.contains("row 1"), "{}", message);
}

#[test]
fn test_runaway_sub_select_recursion_stops_at_depth_limit() {
    use datamapper::types::{ClassDef, PropertyType, ScalarType};

    let mut b = builder();
    b.register_class(
        ClassDef::new("Node")
            .scalar("id", ScalarType::Int)
            .property("children", PropertyType::list_of(PropertyType::Class("Node".into()))),
    )
    .unwrap();
    b.add_result_map(
        ResultMapDef::new("node", "Node")
            .result(ResultPropertyDef::new("id").column("ID"))
            .result(ResultPropertyDef::new("children").column("ID").select("children")),
    )
    .add_statement(StatementDef::select("children", "select ID from nodes where PARENT = #value#").result_map("node"));
    let (mapper, db) = mapper(b);
    db.on("from nodes", Response::rows(ResultSet::new(&["ID"]).with_json_rows(json!([[1]]))));

    let err = mapper.query_for_list("children", &Value::Int(0)).unwrap_err();
    assert!(err.to_string().contains("nested deeper than 8"), "{}", err);
    assert_eq!(db.execution_count("from nodes"), 9);
}
