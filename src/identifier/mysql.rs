use super::charset::BaseCharacterSet;
use super::luhn::LuhnModNValidator;
use super::sequence::next_value;
use super::source::{AutoGenerationOption, IdentifierSourceConfig};
use super::store::SequenceStore;
use crate::error::Error;
use crate::query::PreparedQuery;
use crate::value::ParameterSet;
use async_trait::async_trait;
use sqlx::MySqlPool;
use tracing::debug;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS emr_identifier_source (
    identifier_type VARCHAR(38) NOT NULL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    description VARCHAR(1000) NOT NULL,
    prefix VARCHAR(20) NULL,
    base_character_set VARCHAR(255) NOT NULL,
    first_value VARCHAR(50) NOT NULL,
    min_length INT NULL,
    max_length INT NULL,
    validator_base VARCHAR(255) NULL,
    manual_entry_enabled BOOLEAN NOT NULL,
    automatic_generation_enabled BOOLEAN NOT NULL,
    last_value VARCHAR(50) NULL
)";

const SELECT_SOURCE: &str = "SELECT identifier_type, name, description, prefix, base_character_set,
    first_value, min_length, max_length, validator_base, manual_entry_enabled,
    automatic_generation_enabled, last_value
    FROM emr_identifier_source WHERE identifier_type = :identifier_type";

const INSERT_SOURCE: &str = "INSERT INTO emr_identifier_source (identifier_type, name, description,
    prefix, base_character_set, first_value, min_length, max_length, validator_base,
    manual_entry_enabled, automatic_generation_enabled, last_value)
    VALUES (:identifier_type, :name, :description, :prefix, :base_character_set, :first_value,
    :min_length, :max_length, :validator_base, :manual_entry_enabled,
    :automatic_generation_enabled, NULL)";

const UPDATE_CURSOR: &str =
    "UPDATE emr_identifier_source SET last_value = :last_value WHERE identifier_type = :identifier_type";

#[derive(sqlx::FromRow)]
struct SourceRow {
    identifier_type: String,
    name: String,
    description: String,
    prefix: Option<String>,
    base_character_set: String,
    first_value: String,
    min_length: Option<i32>,
    max_length: Option<i32>,
    validator_base: Option<String>,
    manual_entry_enabled: bool,
    automatic_generation_enabled: bool,
    last_value: Option<String>,
}

impl SourceRow {
    fn into_parts(self) -> crate::Result<(IdentifierSourceConfig, Option<String>)> {
        let length = |n: Option<i32>| n.and_then(|n| usize::try_from(n).ok());
        let validator = self
            .validator_base
            .as_deref()
            .map(BaseCharacterSet::new)
            .transpose()?
            .map(LuhnModNValidator::new);

        let config = IdentifierSourceConfig {
            identifier_type: self.identifier_type,
            name: self.name,
            description: self.description,
            prefix: self.prefix,
            base_character_set: BaseCharacterSet::new(&self.base_character_set)?,
            first_value: self.first_value,
            min_length: length(self.min_length),
            max_length: length(self.max_length),
            validator,
            auto_generation: AutoGenerationOption {
                manual_entry_enabled: self.manual_entry_enabled,
                automatic_generation_enabled: self.automatic_generation_enabled,
            },
        };
        Ok((config, self.last_value))
    }
}

fn by_type(identifier_type: &str) -> ParameterSet {
    ParameterSet::new().with("identifier_type", identifier_type)
}

fn length_param(n: Option<usize>) -> Option<i64> {
    n.and_then(|n| i64::try_from(n).ok())
}

/// Identifier sources persisted in the host MySQL database.
///
/// The cursor is advanced inside a transaction holding a row lock
/// (`SELECT ... FOR UPDATE`), so the read-modify-write is atomic across
/// processes sharing the database, not just within this one.
#[derive(Debug, Clone)]
pub struct MySqlSequenceStore {
    pool: MySqlPool,
}

impl MySqlSequenceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates the backing table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the DDL fails.
    pub async fn migrate(&self) -> crate::Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SequenceStore for MySqlSequenceStore {
    async fn source(&self, identifier_type: &str) -> crate::Result<Option<IdentifierSourceConfig>> {
        let row: Option<SourceRow> = PreparedQuery::new(SELECT_SOURCE, &by_type(identifier_type))?
            .fetch_optional_as(&self.pool)
            .await?;
        row.map(|r| r.into_parts().map(|(config, _)| config)).transpose()
    }

    async fn create(&self, config: IdentifierSourceConfig) -> crate::Result<IdentifierSourceConfig> {
        let params = ParameterSet::new()
            .with("identifier_type", config.identifier_type.as_str())
            .with("name", config.name.as_str())
            .with("description", config.description.as_str())
            .with("prefix", config.prefix.as_deref())
            .with("base_character_set", config.base_character_set.to_string())
            .with("first_value", config.first_value.as_str())
            .with("min_length", length_param(config.min_length))
            .with("max_length", length_param(config.max_length))
            .with(
                "validator_base",
                config
                    .validator
                    .as_ref()
                    .map(|v| v.base_characters().to_string()),
            )
            .with("manual_entry_enabled", config.auto_generation.manual_entry_enabled)
            .with(
                "automatic_generation_enabled",
                config.auto_generation.automatic_generation_enabled,
            );

        match PreparedQuery::new(INSERT_SOURCE, &params)?.execute(&self.pool).await {
            Ok(_) => Ok(config),
            Err(Error::Database(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                Err(Error::AlreadyProvisioned(config.identifier_type))
            }
            Err(e) => Err(e),
        }
    }

    async fn advance(&self, identifier_type: &str) -> crate::Result<String> {
        let mut tx = self.pool.begin().await?;

        let locked = format!("{SELECT_SOURCE} FOR UPDATE");
        let row: SourceRow = PreparedQuery::new(&locked, &by_type(identifier_type))?
            .fetch_optional_as(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("identifier source", identifier_type))?;

        let (config, last) = row.into_parts()?;
        let next = next_value(&config, last.as_deref())?;

        let params = by_type(identifier_type).with("last_value", next.as_str());
        PreparedQuery::new(UPDATE_CURSOR, &params)?
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(identifier_type, value = %next, "advanced persisted cursor");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_bind_by_name() {
        let select = PreparedQuery::new(SELECT_SOURCE, &by_type("abc")).unwrap();
        assert_eq!(select.order(), ["identifier_type"]);

        let insert = PreparedQuery::new(INSERT_SOURCE, &ParameterSet::new()).unwrap();
        assert_eq!(insert.values().len(), 11);

        let update = PreparedQuery::new(UPDATE_CURSOR, &by_type("abc").with("last_value", "7")).unwrap();
        assert_eq!(update.order(), ["last_value", "identifier_type"]);
    }

    #[test]
    fn test_row_into_parts() {
        let row = SourceRow {
            identifier_type: "t".into(),
            name: "MRN".into(),
            description: "d".into(),
            prefix: Some("M".into()),
            base_character_set: "0123456789ACDEFGHJKLMNPRTUVWXY".into(),
            first_value: "0".into(),
            min_length: Some(4),
            max_length: None,
            validator_base: Some("0123456789ACDEFGHJKLMNPRTUVWXY".into()),
            manual_entry_enabled: true,
            automatic_generation_enabled: false,
            last_value: Some("0003".into()),
        };
        let (config, last) = row.into_parts().unwrap();
        assert_eq!(config.min_length, Some(4));
        assert!(config.validator.is_some());
        assert!(!config.auto_generation.automatic_generation_enabled);
        assert_eq!(last.as_deref(), Some("0003"));
    }
}
