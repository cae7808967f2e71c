use crate::config::ConfigProvider;
use crate::error::Error;
use std::collections::HashMap;
use std::sync::Arc;

/// A SQL template resolved for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    id: String,
    sql: String,
}

impl QueryTemplate {
    pub fn new(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Resolves opaque query identifiers to SQL templates.
pub trait QueryRegistry: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing is registered under `query_id`.
    fn resolve(&self, query_id: &str) -> crate::Result<QueryTemplate>;
}

/// Looks templates up in host configuration, keyed by query id.
#[derive(Clone)]
pub struct ConfigQueryRegistry {
    config: Arc<dyn ConfigProvider>,
}

impl ConfigQueryRegistry {
    pub fn new(config: Arc<dyn ConfigProvider>) -> Self {
        Self { config }
    }
}

impl QueryRegistry for ConfigQueryRegistry {
    fn resolve(&self, query_id: &str) -> crate::Result<QueryTemplate> {
        self.config
            .get(query_id)
            .map(|sql| QueryTemplate::new(query_id, sql))
            .ok_or_else(|| Error::not_found("query", query_id))
    }
}

/// A fixed set of templates registered up front.
#[derive(Debug, Clone, Default)]
pub struct StaticQueryRegistry {
    templates: HashMap<String, String>,
}

impl StaticQueryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, query_id: impl Into<String>, sql: impl Into<String>) -> Self {
        self.templates.insert(query_id.into(), sql.into());
        self
    }
}

impl QueryRegistry for StaticQueryRegistry {
    fn resolve(&self, query_id: &str) -> crate::Result<QueryTemplate> {
        self.templates
            .get(query_id)
            .map(|sql| QueryTemplate::new(query_id, sql.clone()))
            .ok_or_else(|| Error::not_found("query", query_id))
    }
}
