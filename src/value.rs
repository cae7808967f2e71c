use crate::error::Error;
use crate::query::BindValue;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Parameter name that triggers the visit-location derivation.
pub const LOCATION_UUID: &str = "location_uuid";

/// Parameter derived from [`LOCATION_UUID`] for templates that filter visits.
pub const VISIT_LOCATION_UUID: &str = "visit_location_uuid";

/// A single typed SQL value.
///
/// Used both for bound parameters and for materialized column values, so a
/// database `NULL` always round-trips as [`SqlValue::Null`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Returns `true` for [`SqlValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string payload of a [`SqlValue::Text`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Binds this value to the next positional placeholder of `q`.
    pub fn bind_to<'q, B: BindValue<'q>>(&self, q: B) -> B {
        match self {
            Self::Null => q.bind_value(Option::<String>::None),
            Self::Bool(b) => q.bind_value(*b),
            Self::Int(n) => q.bind_value(*n),
            Self::Float(f) => q.bind_value(*f),
            Self::Decimal(d) => q.bind_value(*d),
            Self::Text(s) => q.bind_value(s.clone()),
            Self::Date(d) => q.bind_value(*d),
            Self::DateTime(dt) => q.bind_value(*dt),
        }
    }

    /// Converts a scalar JSON value. Arrays and objects are rejected.
    fn from_json_scalar(param: &str, value: &serde_json::Value) -> crate::Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(Self::Decimal(Decimal::from(u)))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(Error::binding(param, format!("unrepresentable number {n}")))
                }
            }
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(_) => Err(Error::binding(param, "nested arrays are not supported")),
            Value::Object(_) => Err(Error::binding(param, "objects are not supported")),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Decimal(d) => serializer.collect_str(d),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Self::DateTime(dt) => serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    Decimal => Decimal,
    String => Text,
    &str => Text,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// The value supplied for one named parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Binds to exactly one positional placeholder.
    Single(SqlValue),
    /// Expands to one positional placeholder per element, for `IN (...)`.
    Multi(Vec<SqlValue>),
}

impl ParameterValue {
    /// The first value, used when a scalar is needed from either shape.
    #[must_use]
    pub fn first(&self) -> Option<&SqlValue> {
        match self {
            Self::Single(v) => Some(v),
            Self::Multi(values) => values.first(),
        }
    }
}

/// Named parameters supplied for one query execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    values: HashMap<String, ParameterValue>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scalar parameter, replacing any previous value under `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, ParameterValue::Single(value.into()));
        self
    }

    /// Adds a multi-valued parameter, replacing any previous value under `name`.
    #[must_use]
    pub fn with_list<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.insert(name, ParameterValue::Multi(values));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.values.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds a parameter set from request-style parameters, where every name
    /// maps to a list of strings.
    ///
    /// One-element lists become scalars; any other length becomes a
    /// multi-valued parameter.
    pub fn from_multi_map<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, mut values) in params {
            let value = if values.len() == 1 {
                ParameterValue::Single(SqlValue::Text(values.remove(0).into()))
            } else {
                ParameterValue::Multi(
                    values
                        .into_iter()
                        .map(|v| SqlValue::Text(v.into()))
                        .collect(),
                )
            };
            set.insert(name, value);
        }
        set
    }

    /// Builds a parameter set from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Binding`] when a value is an object or a nested array,
    /// and when `json` itself is not an object.
    pub fn from_json(json: &serde_json::Value) -> crate::Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| Error::binding("<root>", "parameters must be a JSON object"))?;

        let mut set = Self::new();
        for (name, value) in object {
            let value = match value {
                serde_json::Value::Array(items) => ParameterValue::Multi(
                    items
                        .iter()
                        .map(|item| SqlValue::from_json_scalar(name, item))
                        .collect::<crate::Result<_>>()?,
                ),
                scalar => ParameterValue::Single(SqlValue::from_json_scalar(name, scalar)?),
            };
            set.insert(name.clone(), value);
        }
        Ok(set)
    }

    /// Returns a copy with `visit_location_uuid` derived from `location_uuid`.
    ///
    /// The original `location_uuid` entry is kept. Sets without
    /// `location_uuid` are returned unchanged.
    #[must_use]
    pub fn with_visit_location(&self) -> Self {
        let mut derived = self.clone();
        if let Some(location) = self.get(LOCATION_UUID).and_then(ParameterValue::first) {
            derived.insert(VISIT_LOCATION_UUID, ParameterValue::Single(location.clone()));
        }
        derived
    }

    /// Parameter names in sorted order, for logging.
    pub(crate) fn names(&self) -> Vec<&str> {
        let sorted: BTreeMap<&str, ()> = self.values.keys().map(|k| (k.as_str(), ())).collect();
        sorted.into_keys().collect()
    }
}
