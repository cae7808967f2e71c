use crate::builder::ParsedTemplate;
use crate::row::{ResultRow, RowMaterializer};
use crate::value::{ParameterSet, ParameterValue, SqlValue};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::mysql::{MySqlArguments, MySqlQueryResult, MySqlRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{Encode, Executor, MySql, Type};

/// Type alias for SQLx Query with MySQL arguments
pub type Q<'q> = Query<'q, MySql, MySqlArguments>;

/// Type alias for SQLx QueryAs with MySQL arguments
pub type QA<'q, R> = QueryAs<'q, MySql, R, MySqlArguments>;

/// A statement that accepts values for its positional placeholders.
pub trait BindValue<'q>: Sized {
    #[must_use]
    fn bind_value<T>(self, value: T) -> Self
    where
        T: 'q + Send + Encode<'q, MySql> + Type<MySql>;
}

impl<'q> BindValue<'q> for Q<'q> {
    fn bind_value<T>(self, value: T) -> Self
    where
        T: 'q + Send + Encode<'q, MySql> + Type<MySql>,
    {
        self.bind(value)
    }
}

impl<'q, R> BindValue<'q> for QA<'q, R> {
    fn bind_value<T>(self, value: T) -> Self
    where
        T: 'q + Send + Encode<'q, MySql> + Type<MySql>,
    {
        self.bind(value)
    }
}

/// A named-parameter SQL template bound to a [`ParameterSet`].
///
/// Placeholders are rewritten to positional `?` markers once, at construction,
/// and the values to bind are stored alongside them in placeholder order. A
/// fresh SQLx `Query` is built on every execution, so a `PreparedQuery` can be
/// run any number of times against a pool, a connection or a transaction.
///
/// Binding rules:
///
/// * a placeholder with no entry in the parameter set binds `NULL`;
/// * a parameter no placeholder refers to is ignored;
/// * a multi-valued parameter expands to one `?` per element
///   (an empty list binds a single `NULL`, so `IN (:ids)` stays valid SQL).
///
/// Values are always sent as typed bind arguments, never spliced into the SQL.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx::MySqlPool;
/// use emr_query::{ParameterSet, PreparedQuery};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = MySqlPool::connect("mysql://localhost/openmrs").await?;
///
/// let params = ParameterSet::new()
///     .with("gender", "F")
///     .with_list("ids", [7, 8, 9]);
///
/// let query = PreparedQuery::new(
///     "SELECT patient_id, gender FROM person WHERE gender = :gender AND patient_id IN (:ids)",
///     &params,
/// )?;
///
/// for row in query.fetch_all(&pool).await? {
///     println!("{:?}", row.get("patient_id"));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    sql: String,
    order: Vec<String>,
    values: Vec<SqlValue>,
}

impl PreparedQuery {
    /// Parses `template` and binds `params` to its placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Template`] if the template is malformed.
    pub fn new<T>(template: T, params: &ParameterSet) -> crate::Result<Self>
    where
        T: AsRef<str>,
    {
        let parsed = ParsedTemplate::parse(template.as_ref())?;

        let mut order = Vec::new();
        let mut values = Vec::new();
        for name in parsed.placeholders() {
            match params.get(name) {
                Some(ParameterValue::Multi(list)) if !list.is_empty() => {
                    for value in list {
                        order.push(name.to_owned());
                        values.push(value.clone());
                    }
                }
                Some(ParameterValue::Multi(_)) | None => {
                    order.push(name.to_owned());
                    values.push(SqlValue::Null);
                }
                Some(ParameterValue::Single(value)) => {
                    order.push(name.to_owned());
                    values.push(value.clone());
                }
            }
        }

        let sql = parsed.render(|name| match params.get(name) {
            Some(ParameterValue::Multi(list)) => list.len(),
            _ => 1,
        });

        Ok(Self { sql, order, values })
    }

    /// The positional SQL sent to the database.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Values in the order they are bound.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// The placeholder name each bound value came from, in bind order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    fn query(&self) -> Q<'_> {
        let mut q = sqlx::query::<MySql>(&self.sql);
        for value in &self.values {
            q = value.bind_to(q);
        }
        q
    }

    fn query_as<R>(&self) -> QA<'_, R>
    where
        for<'row> R: sqlx::FromRow<'row, MySqlRow>,
    {
        let mut q = sqlx::query_as::<MySql, R>(&self.sql);
        for value in &self.values {
            q = value.bind_to(q);
        }
        q
    }

    /// Executes the statement, returning affected-row information.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn execute<'e, E>(&self, executor: E) -> crate::Result<MySqlQueryResult>
    where
        E: Executor<'e, Database = MySql>,
    {
        Ok(self.query().execute(executor).await?)
    }

    /// Streams result rows as generic [`ResultRow`]s.
    ///
    /// Column metadata is read from the first row and shared by every row
    /// after it. The stream is single-pass; dropping it releases the cursor.
    pub fn fetch<'e, 'c: 'e, E>(&'e self, executor: E) -> BoxStream<'e, crate::Result<ResultRow>>
    where
        E: 'e + Executor<'c, Database = MySql>,
    {
        let mut materializer = RowMaterializer::new();
        self.query()
            .fetch(executor)
            .map(move |row| materializer.materialize(&row?))
            .boxed()
    }

    /// Collects every result row, preserving result-set order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a column cannot be decoded.
    /// Rows read before the failure are discarded.
    pub async fn fetch_all<'e, 'c: 'e, E>(&'e self, executor: E) -> crate::Result<Vec<ResultRow>>
    where
        E: 'e + Executor<'c, Database = MySql>,
    {
        self.fetch(executor).try_collect().await
    }

    /// Collects every result row as `R` via SQLx's `FromRow`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be converted to `R`.
    pub async fn fetch_all_as<'e, R, E>(&self, executor: E) -> crate::Result<Vec<R>>
    where
        for<'row> R: sqlx::FromRow<'row, MySqlRow> + Send + Unpin,
        E: Executor<'e, Database = MySql>,
    {
        Ok(self.query_as::<R>().fetch_all(executor).await?)
    }

    /// Returns at most one row as `R`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be converted to `R`.
    pub async fn fetch_optional_as<'e, R, E>(&self, executor: E) -> crate::Result<Option<R>>
    where
        for<'row> R: sqlx::FromRow<'row, MySqlRow> + Send + Unpin,
        E: Executor<'e, Database = MySql>,
    {
        Ok(self.query_as::<R>().fetch_optional(executor).await?)
    }
}
