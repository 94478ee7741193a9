use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache model '{cache}': cannot serialize result: {source}")]
    Serialize {
        cache: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache model '{cache}': cannot copy cached result: {source}")]
    Deserialize {
        cache: String,
        #[source]
        source: serde_json::Error,
    },
}
