use super::charset::BaseCharacterSet;
use super::luhn::LuhnModNValidator;
use serde::{Deserialize, Serialize};

/// Longest encoded sequence value (prefix and check character excluded)
/// when a source sets no explicit bound. Matches the persisted column width.
pub const MAX_SEQUENCE_LENGTH: usize = 50;

/// A kind of patient identifier, as defined by the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierType {
    /// Stable identifier of the type
    pub uuid: String,
    /// Display name
    pub name: String,
    /// Check-character validator, if identifiers of this type carry one
    pub validator: Option<LuhnModNValidator>,
}

impl IdentifierType {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            validator: None,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: LuhnModNValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Whether identifiers of a type may be typed in, generated, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoGenerationOption {
    pub manual_entry_enabled: bool,
    pub automatic_generation_enabled: bool,
}

impl Default for AutoGenerationOption {
    fn default() -> Self {
        Self {
            manual_entry_enabled: true,
            automatic_generation_enabled: true,
        }
    }
}

/// A provisioned sequential identifier source.
///
/// Immutable once stored. The mutable cursor lives in the
/// [`super::SequenceStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSourceConfig {
    /// UUID of the owning [`IdentifierType`]
    pub identifier_type: String,
    pub name: String,
    pub description: String,
    pub prefix: Option<String>,
    pub base_character_set: BaseCharacterSet,
    /// First value issued, already padded to `min_length`
    pub first_value: String,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub validator: Option<LuhnModNValidator>,
    pub auto_generation: AutoGenerationOption,
}

impl IdentifierSourceConfig {
    /// Upper bound on the encoded sequence value length.
    #[must_use]
    pub fn length_limit(&self) -> usize {
        self.max_length
            .map_or(MAX_SEQUENCE_LENGTH, |max| max.min(MAX_SEQUENCE_LENGTH))
    }

    /// Turns a raw sequence value into the identifier handed to callers:
    /// prefix, value, then the check character over both when the type has
    /// a validator.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidCharacter`] if the prefix or value
    /// falls outside the validator's alphabet.
    pub fn decorate(&self, value: &str) -> crate::Result<String> {
        let mut identifier = String::with_capacity(
            self.prefix.as_deref().map_or(0, str::len) + value.len() + 1,
        );
        if let Some(prefix) = &self.prefix {
            identifier.push_str(prefix);
        }
        identifier.push_str(value);

        match &self.validator {
            Some(validator) => validator.valid_identifier(&identifier),
            None => Ok(identifier),
        }
    }
}

/// Caller-supplied settings for a new identifier source.
///
/// Unset values are derived during provisioning: the base character set and
/// first value from the identifier type's validator, the description from
/// the type name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRequest {
    pub name: String,
    pub description: Option<String>,
    pub base_character_set: Option<String>,
    pub first_value: Option<String>,
    pub prefix: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl SourceRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn base_character_set(mut self, base: impl Into<String>) -> Self {
        self.base_character_set = Some(base.into());
        self
    }

    #[must_use]
    pub fn first_value(mut self, first: impl Into<String>) -> Self {
        self.first_value = Some(first.into());
        self
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }
}
