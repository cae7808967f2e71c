use super::sequence::next_value;
use super::source::IdentifierSourceConfig;
use crate::error::Error;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Durable home of identifier sources and their cursors.
///
/// `advance` is the only operation that mutates a cursor and must be an
/// atomic read-modify-write: two concurrent calls for the same source never
/// observe the same previous value. Sources for different identifier types
/// must not contend with each other.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Looks up the source for an identifier type.
    async fn source(&self, identifier_type: &str) -> crate::Result<Option<IdentifierSourceConfig>>;

    /// Stores a new source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyProvisioned`] if the identifier type already
    /// has one; the existing source is left untouched.
    async fn create(&self, config: IdentifierSourceConfig) -> crate::Result<IdentifierSourceConfig>;

    /// Issues the next raw sequence value for an identifier type and records
    /// it as the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown identifier type and
    /// [`Error::Capacity`] once the sequence is exhausted. The cursor is not
    /// moved on failure.
    async fn advance(&self, identifier_type: &str) -> crate::Result<String>;
}

#[async_trait]
impl<S: SequenceStore + ?Sized> SequenceStore for Arc<S> {
    async fn source(&self, identifier_type: &str) -> crate::Result<Option<IdentifierSourceConfig>> {
        (**self).source(identifier_type).await
    }

    async fn create(&self, config: IdentifierSourceConfig) -> crate::Result<IdentifierSourceConfig> {
        (**self).create(config).await
    }

    async fn advance(&self, identifier_type: &str) -> crate::Result<String> {
        (**self).advance(identifier_type).await
    }
}

#[derive(Debug)]
struct Entry {
    config: IdentifierSourceConfig,
    cursor: Option<String>,
}

/// Process-local store. Each source has its own lock, so minting for one
/// identifier type never waits on another.
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    sources: RwLock<HashMap<String, Arc<Mutex<Entry>>>>,
}

impl InMemorySequenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn source(&self, identifier_type: &str) -> crate::Result<Option<IdentifierSourceConfig>> {
        let entry = self.sources.read().get(identifier_type).cloned();
        Ok(entry.map(|e| e.lock().config.clone()))
    }

    async fn create(&self, config: IdentifierSourceConfig) -> crate::Result<IdentifierSourceConfig> {
        let mut sources = self.sources.write();
        if sources.contains_key(&config.identifier_type) {
            return Err(Error::AlreadyProvisioned(config.identifier_type));
        }
        sources.insert(
            config.identifier_type.clone(),
            Arc::new(Mutex::new(Entry {
                config: config.clone(),
                cursor: None,
            })),
        );
        Ok(config)
    }

    async fn advance(&self, identifier_type: &str) -> crate::Result<String> {
        let entry = self
            .sources
            .read()
            .get(identifier_type)
            .cloned()
            .ok_or_else(|| Error::not_found("identifier source", identifier_type))?;

        let mut entry = entry.lock();
        let next = next_value(&entry.config, entry.cursor.as_deref())?;
        entry.cursor = Some(next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::charset::BaseCharacterSet;
    use crate::identifier::source::AutoGenerationOption;

    fn config(identifier_type: &str, first: &str) -> IdentifierSourceConfig {
        IdentifierSourceConfig {
            identifier_type: identifier_type.into(),
            name: format!("{identifier_type} source"),
            description: String::new(),
            prefix: None,
            base_character_set: BaseCharacterSet::new("0123456789").unwrap(),
            first_value: first.into(),
            min_length: None,
            max_length: None,
            validator: None,
            auto_generation: AutoGenerationOption::default(),
        }
    }

    #[tokio::test]
    async fn test_create_then_source() {
        let store = InMemorySequenceStore::new();
        assert!(store.source("a").await.unwrap().is_none());

        store.create(config("a", "5")).await.unwrap();
        let found = store.source("a").await.unwrap().unwrap();
        assert_eq!(found.first_value, "5");
    }

    #[tokio::test]
    async fn test_duplicate_create_keeps_original() {
        let store = InMemorySequenceStore::new();
        store.create(config("a", "5")).await.unwrap();

        let err = store.create(config("a", "9")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyProvisioned(_)));
        assert_eq!(store.advance("a").await.unwrap(), "5");
    }

    #[tokio::test]
    async fn test_advance_moves_cursor_per_type() {
        let store = InMemorySequenceStore::new();
        store.create(config("a", "0")).await.unwrap();
        store.create(config("b", "100")).await.unwrap();

        assert_eq!(store.advance("a").await.unwrap(), "0");
        assert_eq!(store.advance("b").await.unwrap(), "100");
        assert_eq!(store.advance("a").await.unwrap(), "1");
        assert_eq!(store.advance("b").await.unwrap(), "101");
    }

    #[tokio::test]
    async fn test_advance_unknown_type() {
        let err = InMemorySequenceStore::new().advance("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { key, .. } if key == "nope"));
    }

    #[tokio::test]
    async fn test_shared_through_arc() {
        let store = Arc::new(InMemorySequenceStore::new());
        store.create(config("a", "0")).await.unwrap();
        let other = Arc::clone(&store);
        assert_eq!(SequenceStore::advance(&other, "a").await.unwrap(), "0");
        assert_eq!(store.advance("a").await.unwrap(), "1");
    }
}
