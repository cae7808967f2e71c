use super::charset::BaseCharacterSet;
use super::source::{AutoGenerationOption, IdentifierSourceConfig, IdentifierType, SourceRequest};
use super::store::SequenceStore;
use crate::error::Error;
use tracing::{debug, info};

/// Provisions identifier sources and mints identifiers from them.
///
/// Minting is safe under concurrency: the cursor update happens inside the
/// store's per-source critical section, and the prefix and check character
/// are derived from the issued value afterwards.
pub struct SequentialIdentifierGenerator<S> {
    store: S,
}

impl<S: SequenceStore> SequentialIdentifierGenerator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the identifier source for `identifier_type`.
    ///
    /// A missing base character set or first value is taken from the type's
    /// validator (its alphabet, and that alphabet's first character). Without
    /// a validator both must be supplied.
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyProvisioned`] if the type already has a source.
    /// * [`Error::Config`] if the base is missing, too short or repeats a
    ///   character, if the first value is missing, empty, too long or uses
    ///   characters outside the base, or if the prefix or base cannot be
    ///   checksummed by the type's validator.
    pub async fn provision(
        &self,
        identifier_type: &IdentifierType,
        request: SourceRequest,
    ) -> crate::Result<IdentifierSourceConfig> {
        if self.store.source(&identifier_type.uuid).await?.is_some() {
            return Err(Error::AlreadyProvisioned(identifier_type.name.clone()));
        }

        let validator = identifier_type.validator.as_ref();

        let first_value = match (request.first_value, validator) {
            (Some(first), _) => first,
            (None, Some(v)) => v.base_characters().first().to_string(),
            (None, None) => {
                return Err(Error::Config(format!(
                    "a first value is required for {} because it has no checksum validator",
                    identifier_type.name
                )))
            }
        };

        let base = match (request.base_character_set, validator) {
            (Some(base), _) => BaseCharacterSet::new(&base)?,
            (None, Some(v)) => v.base_characters().clone(),
            (None, None) => {
                return Err(Error::Config(format!(
                    "a base character set is required for {} because it has no checksum validator",
                    identifier_type.name
                )))
            }
        };

        if first_value.is_empty() {
            return Err(Error::Config("first value must not be empty".into()));
        }
        base.check(&first_value)
            .map_err(|e| Error::Config(format!("invalid first value '{first_value}': {e}")))?;

        if let Some(v) = validator {
            let alphabet = v.base_characters();
            alphabet
                .check(&base.to_string())
                .map_err(|e| Error::Config(format!("base character set cannot be checksummed: {e}")))?;
            if let Some(prefix) = &request.prefix {
                alphabet
                    .check(prefix)
                    .map_err(|e| Error::Config(format!("prefix cannot be checksummed: {e}")))?;
            }
        }

        let config = IdentifierSourceConfig {
            identifier_type: identifier_type.uuid.clone(),
            description: request
                .description
                .unwrap_or_else(|| format!("Identifier Generator for {}", identifier_type.name)),
            name: request.name,
            prefix: request.prefix,
            first_value: super::sequence::pad(&base, &first_value, request.min_length),
            base_character_set: base,
            min_length: request.min_length,
            max_length: request.max_length,
            validator: identifier_type.validator.clone(),
            auto_generation: AutoGenerationOption::default(),
        };

        if config.first_value.chars().count() > config.length_limit() {
            return Err(Error::Config(format!(
                "first value '{}' is longer than {} characters",
                config.first_value,
                config.length_limit()
            )));
        }

        let config = self.store.create(config).await.map_err(|e| match e {
            Error::AlreadyProvisioned(_) => Error::AlreadyProvisioned(identifier_type.name.clone()),
            other => other,
        })?;

        info!(
            identifier_type = %identifier_type.name,
            source = %config.name,
            base = %config.base_character_set,
            first = %config.first_value,
            "provisioned identifier source"
        );
        Ok(config)
    }

    /// The source provisioned for `identifier_type`, if any.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn source(&self, identifier_type: &IdentifierType) -> crate::Result<Option<IdentifierSourceConfig>> {
        self.store.source(&identifier_type.uuid).await
    }

    /// Issues the next identifier from `config`.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if `config` was never provisioned in this store.
    /// * [`Error::Capacity`] once the sequence is exhausted.
    pub async fn mint_next(&self, config: &IdentifierSourceConfig) -> crate::Result<String> {
        let value = self.store.advance(&config.identifier_type).await?;
        let identifier = config.decorate(&value)?;
        debug!(source = %config.name, %identifier, "minted identifier");
        Ok(identifier)
    }

    /// Looks up the source for `identifier_type` and issues its next identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the type has no source, otherwise as
    /// [`Self::mint_next`].
    pub async fn mint_next_for(&self, identifier_type: &IdentifierType) -> crate::Result<String> {
        let config = self
            .source(identifier_type)
            .await?
            .ok_or_else(|| Error::not_found("identifier source", identifier_type.name.clone()))?;
        self.mint_next(&config).await
    }
}
