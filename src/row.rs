use crate::value::SqlValue;
use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::sync::Arc;

/// One result-set row as an ordered mapping of column name to typed value.
///
/// Rows produced by the same query share a single column-name list.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl ResultRow {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Looks up a value by column name. With duplicate names the first wins.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(column, value)` pairs in result-set column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// How a column is decoded, chosen from its MySQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Null,
    Bool,
    Int,
    UInt,
    Year,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    DateTime,
    Time,
    Json,
}

impl ColumnKind {
    pub(crate) fn from_type_name(name: &str) -> Self {
        match name {
            "NULL" => Self::Null,
            "BOOLEAN" => Self::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Self::Int,
            n if n.ends_with(" UNSIGNED") => Self::UInt,
            "YEAR" => Self::Year,
            "FLOAT" | "DOUBLE" => Self::Float,
            "DECIMAL" => Self::Decimal,
            "DATE" => Self::Date,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            "TIME" => Self::Time,
            "JSON" => Self::Json,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => Self::Bytes,
            _ => Self::Text,
        }
    }
}

#[derive(Debug)]
struct Layout {
    names: Arc<[String]>,
    kinds: Vec<ColumnKind>,
}

impl Layout {
    fn read(row: &MySqlRow) -> Self {
        let columns = row.columns();
        Self {
            names: columns.iter().map(|c| c.name().to_owned()).collect(),
            kinds: columns
                .iter()
                .map(|c| ColumnKind::from_type_name(c.type_info().name()))
                .collect(),
        }
    }
}

/// Converts MySQL rows of one result set into [`ResultRow`]s.
///
/// Column names and decode kinds are captured from the first row and reused
/// for the rest of the result set. Use one materializer per query.
#[derive(Debug, Default)]
pub struct RowMaterializer {
    layout: Option<Layout>,
}

impl RowMaterializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every column of `row`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Database`] when a column value cannot be
    /// decoded as its declared type. Decode failures are never turned into
    /// nulls.
    pub fn materialize(&mut self, row: &MySqlRow) -> crate::Result<ResultRow> {
        let layout = self.layout.get_or_insert_with(|| Layout::read(row));

        let mut values = Vec::with_capacity(layout.kinds.len());
        for (index, kind) in layout.kinds.iter().enumerate() {
            values.push(decode(row, index, *kind)?);
        }
        Ok(ResultRow::new(Arc::clone(&layout.names), values))
    }
}

fn decode(row: &MySqlRow, index: usize, kind: ColumnKind) -> crate::Result<SqlValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match kind {
        ColumnKind::Null => SqlValue::Null,
        ColumnKind::Bool => SqlValue::Bool(row.try_get(index)?),
        ColumnKind::Int => SqlValue::Int(row.try_get(index)?),
        ColumnKind::UInt => {
            let n: u64 = row.try_get(index)?;
            i64::try_from(n).map_or_else(|_| SqlValue::Decimal(n.into()), SqlValue::Int)
        }
        ColumnKind::Year => SqlValue::Int(row.try_get_unchecked::<u16, _>(index)?.into()),
        ColumnKind::Float => SqlValue::Float(row.try_get(index)?),
        ColumnKind::Decimal => SqlValue::Decimal(row.try_get(index)?),
        ColumnKind::Text => SqlValue::Text(row.try_get_unchecked(index)?),
        ColumnKind::Bytes => {
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        ColumnKind::Date => SqlValue::Date(row.try_get(index)?),
        ColumnKind::DateTime => SqlValue::DateTime(row.try_get(index)?),
        ColumnKind::Time => {
            let time: MySqlTime = row.try_get(index)?;
            SqlValue::Text(time.to_string())
        }
        ColumnKind::Json => {
            let json: serde_json::Value = row.try_get(index)?;
            SqlValue::Text(json.to_string())
        }
    };
    Ok(value)
}
