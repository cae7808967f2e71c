/// Error types for emr-query
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Nothing is registered under the given key
    #[error("No such {kind}: {key}")]
    NotFound {
        /// What was being looked up (`query`, `identifier source`, ...)
        kind: &'static str,
        /// The key that failed to resolve
        key: String,
    },

    /// The SQL template could not be parsed
    #[error("Malformed SQL template at byte {position}: {reason}")]
    Template {
        /// Byte offset of the offending token
        position: usize,
        /// What is wrong with it
        reason: String,
    },

    /// A parameter value cannot be bound
    #[error("Cannot bind parameter '{param}': {reason}")]
    Binding {
        /// The parameter name
        param: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Database failure while running a registered query
    #[error("Query '{query_id}' failed: {source}")]
    QueryExecution {
        /// The registered query identifier
        query_id: String,
        /// The underlying database error
        #[source]
        source: sqlx::Error,
    },

    /// An identifier source already exists for this identifier type
    #[error("Identifier source already exists for {0}")]
    AlreadyProvisioned(String),

    /// Invalid configuration (base character set, start value, missing key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sequence cannot produce another value without exceeding its bounds
    #[error("Identifier source '{source_name}' exhausted: {reason}")]
    Capacity {
        /// Name of the identifier source
        source_name: String,
        /// Which bound was hit
        reason: String,
    },

    /// A character is not part of the base character set
    #[error("Character '{character}' is not in base character set '{base}'")]
    InvalidCharacter {
        /// The offending character
        character: char,
        /// The base character set
        base: String,
    },

    /// Error from SQLx database operations
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The placeholder pattern failed to compile
    #[error("Failed to compile placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Transport failure while delivering an SMS
    #[error("SMS transport error: {0}")]
    Sms(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub(crate) fn binding(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Binding {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Attaches a query identifier to a raw database failure.
    ///
    /// Errors other than [`Error::Database`] are returned unchanged.
    pub(crate) fn in_query(self, query_id: &str) -> Self {
        match self {
            Self::Database(source) => Self::QueryExecution {
                query_id: query_id.to_owned(),
                source,
            },
            other => other,
        }
    }
}

/// Result type alias for emr-query operations
pub type Result<T> = std::result::Result<T, Error>;
