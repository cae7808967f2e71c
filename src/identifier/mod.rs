//! Sequential patient identifiers with Luhn mod N check characters.
//!
//! An [`IdentifierType`] is provisioned once with a source (alphabet, first
//! value, optional prefix and length bounds). The
//! [`SequentialIdentifierGenerator`] then issues strictly increasing values
//! from it, each decorated with the prefix and, when the type has a
//! validator, a trailing check character.

mod charset;
mod generator;
mod luhn;
mod mysql;
mod sequence;
mod source;
mod store;

pub use charset::BaseCharacterSet;
pub use generator::SequentialIdentifierGenerator;
pub use luhn::{checksum, is_valid, LuhnModNValidator, MOD10_BASE, MOD30_BASE};
pub use mysql::MySqlSequenceStore;
pub use sequence::{increment, next_value, pad};
pub use source::{AutoGenerationOption, IdentifierSourceConfig, IdentifierType, SourceRequest, MAX_SEQUENCE_LENGTH};
pub use store::{InMemorySequenceStore, SequenceStore};
