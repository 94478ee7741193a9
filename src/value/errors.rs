use thiserror::Error;

/// Failure of a deferred (lazy) load.
#[derive(Debug, Error)]
#[error("lazy load of '{statement}' failed: {source}")]
pub struct LazyLoadError {
    pub statement: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("type '{type_name}' has no property '{property}'")]
    NoSuchProperty { type_name: String, property: String },

    #[error("cannot access property '{property}' on a {kind} value")]
    NotAnObject { property: String, kind: &'static str },

    #[error("index {index} out of bounds for '{property}' (length {len})")]
    IndexOutOfBounds {
        property: String,
        index: usize,
        len: usize,
    },

    #[error("'{property}' is not a list (found {kind})")]
    NotAList { property: String, kind: &'static str },

    #[error("unresolved iteration index in '{0}'")]
    UnresolvedIndex(String),

    #[error("invalid property path '{0}'")]
    InvalidPath(String),

    #[error(transparent)]
    LazyLoad(#[from] LazyLoadError),
}
