//! Inserts, updates, select keys and stored procedures.

use serde_json::json;

use datamapper::driver::memory::{Response, ResultSet};
use datamapper::driver::{CommandKind, ParameterDirection};
use datamapper::parameters::{ParameterMapDef, ParameterPropertyDef};
use datamapper::statement::{SelectKeyDef, SelectKeyType, StatementDef, StatementKind};
use datamapper::{DataMapperError, ExecuteOutcome, Value};

use super::common::{builder, mapper, object, prop};

fn insert_account(key: SelectKeyType) -> StatementDef {
    StatementDef::new("insertAccount", StatementKind::Insert)
        .text("insert into accounts (ACC_ID, ACC_NAME) values (#id#, #name#)")
        .parameter_class("Account")
        .select_key(SelectKeyDef::new("id", "select next_id from sequence", key).result_class("int"))
}

#[test]
fn test_insert_with_post_select_key() {
    let mut b = builder();
    b.add_statement(insert_account(SelectKeyType::Post));
    let (mapper, db) = mapper(b);
    db.on("insert into accounts", Response::Affected(1));
    db.on("from sequence", Response::rows(ResultSet::new(&["NEXT_ID"]).with_json_rows(json!([[41]]))));

    let account = object(mapper.configuration(), "Account", &[("name", Value::from("carol"))]);
    let key = mapper.insert("insertAccount", &account).unwrap();
    assert_eq!(key, Some(Value::Int(41)));
    assert_eq!(prop(&account, "id"), Value::Int(41));

    let executed = db.executed();
    assert!(executed[0].text.starts_with("insert into accounts"));
    assert_eq!(executed[0].values(), vec![Value::Null, Value::from("carol")]);
    assert!(executed[1].text.contains("from sequence"));
}

#[test]
fn test_insert_with_pre_select_key_binds_the_key() {
    let mut b = builder();
    b.add_statement(insert_account(SelectKeyType::Pre));
    let (mapper, db) = mapper(b);
    db.on("insert into accounts", Response::Affected(1));
    db.on("from sequence", Response::rows(ResultSet::new(&["NEXT_ID"]).with_json_rows(json!([[7]]))));

    let account = object(mapper.configuration(), "Account", &[("name", Value::from("dave"))]);
    mapper.insert("insertAccount", &account).unwrap();

    let executed = db.executed();
    assert!(executed[0].text.contains("from sequence"));
    assert_eq!(executed[1].values(), vec![Value::Int(7), Value::from("dave")]);
}

#[test]
fn test_insert_with_map_parameter_returns_key_only() {
    let mut b = builder();
    b.add_statement(
        StatementDef::new("insertRow", StatementKind::Insert)
            .text("insert into rows (NAME) values (#name#)")
            .select_key(SelectKeyDef::new("id", "select last_id()", SelectKeyType::Post)),
    );
    let (mapper, db) = mapper(b);
    db.on("insert into rows", Response::Affected(1));
    db.on("last_id()", Response::rows(ResultSet::new(&["ID"]).with_json_rows(json!([[3]]))));

    let key = mapper
        .insert("insertRow", &Value::from(json!({"name": "x"})))
        .unwrap();
    assert_eq!(key, Some(Value::Int(3)));
}

#[test]
fn test_update_delete_and_execute() {
    let mut b = builder();
    b.add_statement(
        StatementDef::new("rename", StatementKind::Update)
            .text("update accounts set ACC_NAME = #name# where ACC_ID = #id#"),
    )
    .add_statement(StatementDef::new("purge", StatementKind::Delete).text("delete from accounts"))
    .add_statement(StatementDef::new("vacuum", StatementKind::Statement).text("vacuum accounts"));
    let (mapper, db) = mapper(b);
    db.on("update accounts", Response::Affected(2));
    db.on("delete from accounts", Response::Affected(5));
    db.on("vacuum", Response::Affected(0));

    let parameter = Value::from(json!({"id": 1, "name": "z"}));
    assert_eq!(mapper.update("rename", &parameter).unwrap(), 2);
    assert_eq!(
        db.last_executed().unwrap().values(),
        vec![Value::from("z"), Value::Int(1)]
    );
    assert_eq!(mapper.delete("purge", &Value::Null).unwrap(), 5);
    assert_eq!(
        mapper.execute("vacuum", &Value::Null).unwrap(),
        ExecuteOutcome::Affected(0)
    );
    assert!(matches!(
        mapper.insert("purge", &Value::Null),
        Err(DataMapperError::WrongStatementKind { .. })
    ));
}

#[test]
fn test_rejected_parameter_names_statement_and_property() {
    let mut b = builder();
    b.add_statement(
        StatementDef::new("rename", StatementKind::Update)
            .text("update accounts set ACC_NAME = #name# where ACC_ID = #id#"),
    );
    let (mapper, db) = mapper(b);
    db.on("update accounts", Response::Affected(1));
    db.reject_parameter("param0", "too long");

    let err = mapper
        .update("rename", &Value::from(json!({"id": 1, "name": "z"})))
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("rename"), "{}", message);
    assert!(message.contains("name"), "{}", message);
}

#[test]
fn test_procedure_output_parameters_written_back() {
    let mut b = builder();
    b.add_parameter_map(
        ParameterMapDef::new("nameLookup")
            .class("Account")
            .parameter(ParameterPropertyDef::new("id"))
            .parameter(ParameterPropertyDef::new("name").direction("out")),
    )
    .add_statement(
        StatementDef::new("lookupName", StatementKind::Procedure)
            .text("account_name")
            .parameter_map("nameLookup"),
    );
    let (mapper, db) = mapper(b);
    db.procedure("account_name", Vec::new(), |params| {
        for p in params.iter_mut() {
            if p.direction == ParameterDirection::Output {
                p.value = Value::from("from proc");
            }
        }
        Response::Affected(1)
    });

    let account = object(mapper.configuration(), "Account", &[("id", Value::Int(9))]);
    mapper.update("lookupName", &account).unwrap();
    assert_eq!(prop(&account, "name"), Value::from("from proc"));

    let executed = db.last_executed().unwrap();
    assert_eq!(executed.kind, CommandKind::StoredProcedure);
    assert_eq!(executed.text, "account_name");
    assert_eq!(executed.parameters[0].value, Value::Int(9));
}
