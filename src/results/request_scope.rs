//! Per-execution materialization state.

use std::collections::{HashMap, VecDeque};

use super::group_by::GroupKey;
use crate::types::PropertyAccessor;
use crate::value::{ObjectRef, Value};

/// Eager sub-select waiting for the main rows to be read.
#[derive(Debug, Clone)]
pub struct DeferredSelect {
    pub target: ObjectRef,
    pub accessor: PropertyAccessor,
    pub statement: String,
    pub parameter: Value,
    /// Set the whole result list rather than its first element.
    pub collection: bool,
}

/// State of one statement execution. Never shared between threads.
#[derive(Debug)]
pub struct RequestScope {
    statement: String,
    depth: usize,
    row: usize,
    result_map_index: usize,
    row_data_found: bool,
    deferred: VecDeque<DeferredSelect>,
    groups: HashMap<String, HashMap<GroupKey, ObjectRef>>,
}

impl RequestScope {
    /// `depth` counts the eager sub-selects this execution is nested in.
    pub fn new(statement: impl Into<String>, depth: usize) -> Self {
        RequestScope {
            statement: statement.into(),
            depth,
            row: 0,
            result_map_index: 0,
            row_data_found: false,
            deferred: VecDeque::new(),
            groups: HashMap::new(),
        }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 1-based number of the current row in the current result set.
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn next_row(&mut self) {
        self.row += 1;
        self.row_data_found = false;
    }

    pub fn result_map_index(&self) -> usize {
        self.result_map_index
    }

    /// Moves to the next result set. Group tables do not span result sets.
    pub fn next_result_set(&mut self) {
        self.result_map_index += 1;
        self.row = 0;
        self.groups.clear();
    }

    pub fn row_data_found(&self) -> bool {
        self.row_data_found
    }

    pub fn mark_row_data(&mut self) {
        self.row_data_found = true;
    }

    pub fn defer(&mut self, select: DeferredSelect) {
        self.deferred.push_back(select);
    }

    pub fn take_deferred(&mut self) -> Option<DeferredSelect> {
        self.deferred.pop_front()
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub fn group(&self, result_map: &str, key: &GroupKey) -> Option<ObjectRef> {
        self.groups.get(result_map).and_then(|g| g.get(key)).cloned()
    }

    pub fn register_group(&mut self, result_map: &str, key: GroupKey, object: ObjectRef) {
        self.groups
            .entry(result_map.to_string())
            .or_default()
            .insert(key, object);
    }
}
