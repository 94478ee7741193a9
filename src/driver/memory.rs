//! Scripted in-memory driver.
//!
//! Responses are registered against SQL fragments; a command matches the most
//! recently registered fragment contained in its whitespace-normalized text.
//! Every executed command is recorded so callers can inspect the SQL and the
//! bound parameters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use regex::Regex;

use super::{
    Command, CommandKind, DataSource, DbParameter, DriverCapabilities, DriverError, RowCursor,
};
use crate::value::Value;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Collapses whitespace runs to one space and trims.
pub fn normalize_sql(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: &[&str]) -> Self {
        ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Rows given as JSON arrays, e.g. `json!([[1, "a"], [2, null]])`.
    pub fn with_json_rows(mut self, rows: serde_json::Value) -> Self {
        if let serde_json::Value::Array(rows) = rows {
            for row in rows {
                if let serde_json::Value::Array(cells) = row {
                    self.rows.push(cells.into_iter().map(Value::from).collect());
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Rows(Vec<ResultSet>),
    Affected(u64),
    Fail(String),
}

impl Response {
    pub fn rows(set: ResultSet) -> Self {
        Response::Rows(vec![set])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    pub kind: CommandKind,
    /// Whitespace-normalized text.
    pub text: String,
    pub parameters: Vec<DbParameter>,
}

impl ExecutedCommand {
    pub fn values(&self) -> Vec<Value> {
        self.parameters.iter().map(|p| p.value.clone()).collect()
    }
}

type ScriptFn = dyn Fn(&ExecutedCommand) -> Response + Send + Sync;
type ProcedureFn = dyn Fn(&mut [DbParameter]) -> Response + Send + Sync;

struct Script {
    fragment: String,
    respond: Arc<ScriptFn>,
}

struct Procedure {
    signature: Vec<DbParameter>,
    respond: Arc<ProcedureFn>,
}

#[derive(Default)]
struct MemoryState {
    scripts: Mutex<Vec<Script>>,
    procedures: Mutex<HashMap<String, Procedure>>,
    rejected: Mutex<HashMap<String, String>>,
    executed: Mutex<Vec<ExecutedCommand>>,
    derive_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MemoryDataSource {
    name: String,
    connection_string: String,
    capabilities: DriverCapabilities,
    state: Arc<MemoryState>,
}

impl MemoryDataSource {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        MemoryDataSource {
            connection_string: format!("memory://{}", name),
            name,
            capabilities: DriverCapabilities::default(),
            state: Arc::new(MemoryState::default()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    /// Fixed response for commands containing `fragment`.
    pub fn on(&self, fragment: &str, response: Response) {
        self.on_fn(fragment, move |_| response.clone());
    }

    /// Computed response for commands containing `fragment`.
    pub fn on_fn(
        &self,
        fragment: &str,
        respond: impl Fn(&ExecutedCommand) -> Response + Send + Sync + 'static,
    ) {
        lock(&self.state.scripts).push(Script {
            fragment: normalize_sql(fragment),
            respond: Arc::new(respond),
        });
    }

    /// Stored procedure with a derivable signature. The handler may write
    /// output parameter values.
    pub fn procedure(
        &self,
        name: &str,
        signature: Vec<DbParameter>,
        respond: impl Fn(&mut [DbParameter]) -> Response + Send + Sync + 'static,
    ) {
        lock(&self.state.procedures).insert(
            name.to_string(),
            Procedure {
                signature,
                respond: Arc::new(respond),
            },
        );
    }

    /// Makes `add_parameter` fail for the parameter with this (unprefixed) name.
    pub fn reject_parameter(&self, name: &str, reason: &str) {
        lock(&self.state.rejected).insert(name.to_string(), reason.to_string());
    }

    pub fn executed(&self) -> Vec<ExecutedCommand> {
        lock(&self.state.executed).clone()
    }

    pub fn last_executed(&self) -> Option<ExecutedCommand> {
        lock(&self.state.executed).last().cloned()
    }

    /// Number of executed commands whose text contains `fragment`.
    pub fn execution_count(&self, fragment: &str) -> usize {
        let fragment = normalize_sql(fragment);
        lock(&self.state.executed)
            .iter()
            .filter(|c| c.text.contains(&fragment))
            .count()
    }

    pub fn clear_executed(&self) {
        lock(&self.state.executed).clear();
    }

    pub fn derive_calls(&self) -> usize {
        self.state.derive_calls.load(Ordering::SeqCst)
    }
}

impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    fn create_command(&self, kind: CommandKind) -> Result<Box<dyn Command>, DriverError> {
        Ok(Box::new(MemoryCommand {
            kind,
            text: String::new(),
            parameters: Vec::new(),
            prefix: self.capabilities.parameter_prefix.clone(),
            state: self.state.clone(),
        }))
    }

    fn derive_parameters(&self, procedure: &str) -> Result<Vec<DbParameter>, DriverError> {
        self.state.derive_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.procedures)
            .get(procedure)
            .map(|p| p.signature.clone())
            .ok_or_else(|| DriverError::UnknownProcedure(procedure.to_string()))
    }
}

struct MemoryCommand {
    kind: CommandKind,
    text: String,
    parameters: Vec<DbParameter>,
    prefix: String,
    state: Arc<MemoryState>,
}

impl MemoryCommand {
    fn run(&mut self) -> Result<Response, DriverError> {
        let executed = ExecutedCommand {
            kind: self.kind,
            text: normalize_sql(&self.text),
            parameters: self.parameters.clone(),
        };
        lock(&self.state.executed).push(executed.clone());

        let response = match self.kind {
            CommandKind::StoredProcedure => {
                let respond = lock(&self.state.procedures)
                    .get(executed.text.as_str())
                    .map(|p| p.respond.clone())
                    .ok_or_else(|| DriverError::UnknownProcedure(executed.text.clone()))?;
                respond(self.parameters.as_mut_slice())
            }
            CommandKind::Text => {
                let respond = lock(&self.state.scripts)
                    .iter()
                    .rev()
                    .find(|s| executed.text.contains(&s.fragment))
                    .map(|s| s.respond.clone())
                    .ok_or_else(|| {
                        DriverError::CommandFailed(format!(
                            "no scripted response for: {}",
                            executed.text
                        ))
                    })?;
                respond(&executed)
            }
        };
        match response {
            Response::Fail(message) => Err(DriverError::CommandFailed(message)),
            other => Ok(other),
        }
    }
}

impl Command for MemoryCommand {
    fn kind(&self) -> CommandKind {
        self.kind
    }

    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn add_parameter(&mut self, parameter: DbParameter) -> Result<(), DriverError> {
        let bare = parameter.name.trim_start_matches(self.prefix.as_str());
        if let Some(reason) = lock(&self.state.rejected).get(bare) {
            return Err(DriverError::ParameterRejected {
                name: parameter.name.clone(),
                reason: reason.clone(),
            });
        }
        self.parameters.push(parameter);
        Ok(())
    }

    fn parameters(&self) -> &[DbParameter] {
        &self.parameters
    }

    fn execute_query(&mut self) -> Result<Box<dyn RowCursor>, DriverError> {
        let sets = match self.run()? {
            Response::Rows(sets) => sets,
            _ => Vec::new(),
        };
        Ok(Box::new(MemoryCursor {
            sets,
            set: 0,
            row: None,
        }))
    }

    fn execute_non_query(&mut self) -> Result<u64, DriverError> {
        match self.run()? {
            Response::Affected(n) => Ok(n),
            Response::Rows(sets) => Ok(sets.first().map_or(0, |s| s.rows.len() as u64)),
            Response::Fail(message) => Err(DriverError::CommandFailed(message)),
        }
    }
}

struct MemoryCursor {
    sets: Vec<ResultSet>,
    set: usize,
    row: Option<usize>,
}

impl MemoryCursor {
    fn current_set(&self) -> Option<&ResultSet> {
        self.sets.get(self.set)
    }

    fn current_row(&self) -> Result<&[Value], DriverError> {
        let set = self.current_set().ok_or(DriverError::NoCurrentRow)?;
        let row = self.row.ok_or(DriverError::NoCurrentRow)?;
        set.rows
            .get(row)
            .map(Vec::as_slice)
            .ok_or(DriverError::NoCurrentRow)
    }
}

impl RowCursor for MemoryCursor {
    fn read(&mut self) -> Result<bool, DriverError> {
        let Some(len) = self.current_set().map(|s| s.rows.len()) else {
            return Ok(false);
        };
        let next = self.row.map_or(0, |r| r + 1);
        self.row = Some(next.min(len));
        Ok(next < len)
    }

    fn column_count(&self) -> usize {
        self.current_set().map_or(0, |s| s.columns.len())
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.current_set()
            .and_then(|s| s.columns.get(index))
            .map(String::as_str)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.current_set()?
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    fn get_value(&self, index: usize) -> Result<Value, DriverError> {
        self.current_row()?
            .get(index)
            .cloned()
            .ok_or(DriverError::ColumnOutOfRange(index))
    }

    fn is_null(&self, index: usize) -> bool {
        matches!(self.get_value(index), Ok(Value::Null))
    }

    fn next_result(&mut self) -> Result<bool, DriverError> {
        self.set += 1;
        self.row = None;
        Ok(self.set < self.sets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_sql() {
        assert_eq!(normalize_sql("  select *\n\t from  t "), "select * from t");
    }

    #[test]
    fn test_scripted_query_and_recording() {
        let ds = MemoryDataSource::new("test");
        ds.on(
            "from accounts",
            Response::rows(ResultSet::new(&["id", "name"]).with_json_rows(json!([[1, "a"], [2, null]]))),
        );
        let mut cmd = ds.create_command(CommandKind::Text).unwrap();
        cmd.set_text("select id, name\n  from accounts where id > ?");
        cmd.add_parameter(DbParameter {
            name: "param0".into(),
            value: Value::Int(0),
            ..Default::default()
        })
        .unwrap();
        let mut cursor = cmd.execute_query().unwrap();
        assert_eq!(cursor.column_index("NAME"), Some(1));
        assert!(cursor.read().unwrap());
        assert_eq!(cursor.get_value(0).unwrap(), Value::Int(1));
        assert!(cursor.read().unwrap());
        assert!(cursor.is_null(1));
        assert!(!cursor.read().unwrap());
        assert!(!cursor.read().unwrap());

        let executed = ds.last_executed().unwrap();
        assert_eq!(executed.text, "select id, name from accounts where id > ?");
        assert_eq!(executed.values(), vec![Value::Int(0)]);
        assert_eq!(ds.execution_count("FROM accounts"), 0);
        assert_eq!(ds.execution_count("from accounts"), 1);
    }

    #[test]
    fn test_unscripted_command_fails() {
        let ds = MemoryDataSource::new("test");
        let mut cmd = ds.create_command(CommandKind::Text).unwrap();
        cmd.set_text("delete from nowhere");
        assert!(matches!(
            cmd.execute_non_query(),
            Err(DriverError::CommandFailed(_))
        ));
    }

    #[test]
    fn test_rejected_parameter() {
        let ds = MemoryDataSource::new("test");
        ds.reject_parameter("param1", "too long");
        let mut cmd = ds.create_command(CommandKind::Text).unwrap();
        let err = cmd
            .add_parameter(DbParameter {
                name: "@param1".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, DriverError::ParameterRejected { .. }));
    }

    #[test]
    fn test_multiple_result_sets() {
        let ds = MemoryDataSource::new("test");
        ds.on(
            "select",
            Response::Rows(vec![
                ResultSet::new(&["a"]).row(vec![Value::Int(1)]),
                ResultSet::new(&["b"]).row(vec![Value::Int(2)]).row(vec![Value::Int(3)]),
            ]),
        );
        let mut cmd = ds.create_command(CommandKind::Text).unwrap();
        cmd.set_text("select");
        let mut cursor = cmd.execute_query().unwrap();
        assert!(cursor.read().unwrap());
        assert!(cursor.next_result().unwrap());
        assert_eq!(cursor.column_name(0), Some("b"));
        assert!(cursor.read().unwrap());
        assert!(cursor.read().unwrap());
        assert!(!cursor.read().unwrap());
        assert!(!cursor.next_result().unwrap());
    }

    #[test]
    fn test_procedure_outputs_and_derive() {
        let ds = MemoryDataSource::new("test");
        ds.procedure(
            "sp_total",
            vec![DbParameter {
                name: "@total".into(),
                direction: crate::driver::ParameterDirection::Output,
                ..Default::default()
            }],
            |params| {
                params[0].value = Value::Int(99);
                Response::Affected(0)
            },
        );
        let signature = ds.derive_parameters("sp_total").unwrap();
        assert_eq!(signature.len(), 1);
        assert_eq!(ds.derive_calls(), 1);

        let mut cmd = ds.create_command(CommandKind::StoredProcedure).unwrap();
        cmd.set_text("sp_total");
        cmd.add_parameter(signature[0].clone()).unwrap();
        cmd.execute_non_query().unwrap();
        assert_eq!(cmd.parameters()[0].value, Value::Int(99));
        assert!(ds.derive_parameters("sp_missing").is_err());
    }
}
