//! Result maps and row materialization.
//!
//! A [`ResultMap`] is compiled once from a [`ResultMapDef`]; the
//! [`Materializer`] turns the rows of one execution into values, keeping its
//! per-execution state (group tables, deferred sub-selects) in a
//! [`RequestScope`].

pub mod auto_map;
pub mod errors;
pub mod group_by;
pub mod materializer;
pub mod request_scope;
pub mod result_map;
pub mod result_property;
pub mod sub_select;

use std::collections::HashMap;
use std::sync::Arc;

pub use auto_map::AutoResultMap;
pub use errors::MaterializationError;
pub use materializer::{MaterializeContext, Materializer, ResultTarget};
pub use request_scope::RequestScope;
pub use result_map::{DiscriminatorDef, ResultMap, ResultMapDef};
pub use result_property::{ResultProperty, ResultPropertyDef};
pub use sub_select::StatementExecutor;

/// Compiled result maps by id.
pub type ResultMaps = HashMap<String, Arc<ResultMap>>;
