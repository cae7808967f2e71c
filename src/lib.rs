//! # emr-query
//!
//! Named-parameter SQL search and sequential patient identifiers for a
//! clinical records platform running on MySQL.
//!
//! ## Features
//!
//! - **Named Placeholders**: Registered queries use `:param_name`; values are bound positionally, never spliced into SQL text
//! - **Multi-valued Parameters**: A list expands to `?, ?, ?` so `IN (:ids)` just works
//! - **Generic Rows**: Results come back as ordered column/value maps with explicit NULLs, streamed or collected
//! - **HRTB Pattern**: SQL and values are stored side by side and a fresh SQLx `Query` is built per execution
//! - **Sequential Identifiers**: Strictly increasing values over any alphabet, with prefixes and Luhn mod N check characters
//! - **Pluggable Storage**: Identifier cursors live in memory or in MySQL behind the same async trait
//!
//! ## Examples
//!
//! ### Running a Registered Query
//!
//! ```rust,no_run
//! use emr_query::{ParameterSet, QueryService, StaticQueryRegistry};
//! use sqlx::MySqlPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = MySqlPool::connect("mysql://localhost/openmrs").await?;
//!
//! let registry = StaticQueryRegistry::new().register(
//!     "patients.by_location",
//!     "SELECT patient_id, given_name FROM patient_list WHERE location = :location_uuid AND status IN (:status)",
//! );
//! let service = QueryService::new(registry, pool);
//!
//! let params = ParameterSet::new()
//!     .with("location_uuid", "8d6c993e-c2cc-11de-8d13-0010c6dffd0f")
//!     .with_list("status", ["active", "transferred"]);
//!
//! for row in service.execute("patients.by_location", &params).await? {
//!     println!("{:?}", row.get("given_name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Ad-hoc Statements and Transactions
//!
//! ```rust,no_run
//! use emr_query::{ParameterSet, PreparedQuery};
//! use sqlx::MySqlPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let pool = MySqlPool::connect("mysql://localhost/openmrs").await?;
//! let mut tx = pool.begin().await?;
//!
//! let params = ParameterSet::new().with("patient_id", 42).with("reason", "duplicate");
//! PreparedQuery::new(
//!     "UPDATE patient SET voided = 1, void_reason = :reason WHERE patient_id = :patient_id",
//!     &params,
//! )?
//! .execute(&mut *tx)
//! .await?;
//!
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Minting Identifiers
//!
//! ```rust
//! use emr_query::identifier::{
//!     IdentifierType, InMemorySequenceStore, LuhnModNValidator, SequentialIdentifierGenerator,
//!     SourceRequest,
//! };
//!
//! # async fn example() -> emr_query::Result<()> {
//! let generator = SequentialIdentifierGenerator::new(InMemorySequenceStore::new());
//! let mrn = IdentifierType::new("mrn", "OpenMRS ID").with_validator(LuhnModNValidator::mod30()?);
//!
//! let source = generator.provision(&mrn, SourceRequest::new("MRN").prefix("M")).await?;
//! let first = generator.mint_next(&source).await?;
//! assert!(mrn.validator.as_ref().is_some_and(|v| v.is_valid(&first)));
//! # Ok(())
//! # }
//! ```
//!
//! ## How It Works
//!
//! 1. **Resolve**: A query id is looked up in a [`QueryRegistry`]
//! 2. **Parse**: Named placeholders are found outside quoted text and comments and rewritten to `?`
//! 3. **Bind**: Values are lined up in placeholder order; missing names bind NULL
//! 4. **Execute**: A fresh SQLx `Query` is built on a pooled connection and rows are materialized
//!
//! ## Limitations
//!
//! - MySQL only
//! - Placeholder names must match `[A-Za-z_][A-Za-z0-9_]*`

pub mod builder;
pub mod config;
pub mod emr;
pub mod error;
pub mod host;
pub mod identifier;
pub mod logging;
pub mod query;
pub mod registry;
pub mod reports;
pub mod row;
pub mod service;
pub mod setup;
pub mod sms;
pub mod value;

pub use config::{ConfigProvider, DatabaseConfig, StaticConfig};
pub use emr::{EmrService, HostServices, IdentifierTypes};
pub use error::{Error, Result};
pub use query::PreparedQuery;
pub use registry::{ConfigQueryRegistry, QueryRegistry, QueryTemplate, StaticQueryRegistry};
pub use row::ResultRow;
pub use service::QueryService;
pub use value::{ParameterSet, ParameterValue, SqlValue};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::identifier::{
        IdentifierType, LuhnModNValidator, SequenceStore, SequentialIdentifierGenerator,
        SourceRequest,
    };
    pub use crate::{ConfigProvider, ParameterSet, PreparedQuery, QueryRegistry, QueryService, ResultRow, SqlValue};
}
