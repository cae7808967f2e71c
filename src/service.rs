use crate::query::PreparedQuery;
use crate::registry::QueryRegistry;
use crate::row::ResultRow;
use crate::value::ParameterSet;
use crate::Error;
use sqlx::MySqlPool;
use tracing::{debug, instrument, warn};

/// Runs registered named-parameter queries.
///
/// `execute` resolves the template, derives `visit_location_uuid` from
/// `location_uuid`, binds, and only then checks a connection out of the pool.
/// The connection, statement and cursor are all released when the call
/// returns, whether it succeeded or not.
pub struct QueryService<R> {
    registry: R,
    pool: MySqlPool,
}

impl<R: QueryRegistry> QueryService<R> {
    pub fn new(registry: R, pool: MySqlPool) -> Self {
        Self { registry, pool }
    }

    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Resolves and binds without touching the database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id and
    /// [`Error::Template`] for a malformed template.
    pub fn prepare(&self, query_id: &str, params: &ParameterSet) -> crate::Result<PreparedQuery> {
        let template = self.registry.resolve(query_id)?;
        let params = params.with_visit_location();
        PreparedQuery::new(template.sql(), &params).inspect_err(|e| {
            warn!(query_id, error = %e, "rejected query template");
        })
    }

    /// Executes a registered query and returns every row in result-set order.
    ///
    /// # Errors
    ///
    /// Resolution and template errors are returned as-is, before any
    /// connection is acquired. Database failures are wrapped in
    /// [`Error::QueryExecution`] carrying `query_id`; rows read before the
    /// failure are discarded.
    #[instrument(skip(self, params), fields(params = ?params.names()))]
    pub async fn execute(&self, query_id: &str, params: &ParameterSet) -> crate::Result<Vec<ResultRow>> {
        let prepared = self.prepare(query_id, params)?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::Database(e).in_query(query_id))?;

        let rows = prepared
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| e.in_query(query_id))?;

        debug!(rows = rows.len(), "query executed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticQueryRegistry;
    use crate::value::{SqlValue, VISIT_LOCATION_UUID};
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;

    fn lazy_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("mysql://nobody@127.0.0.1:1/none")
            .unwrap()
    }

    fn service() -> QueryService<StaticQueryRegistry> {
        let registry = StaticQueryRegistry::new()
            .register("visits", "SELECT * FROM t WHERE loc = :location_uuid")
            .register(
                "visits.by_location",
                "SELECT * FROM visit WHERE location = :location_uuid OR visit_location = :visit_location_uuid",
            )
            .register("broken", "SELECT * FROM t WHERE a = 'open");
        QueryService::new(registry, lazy_pool())
    }

    #[tokio::test]
    async fn test_unknown_query_fails_before_connecting() {
        let service = service();
        let err = service.execute("missing", &ParameterSet::new()).await.unwrap_err();

        assert!(matches!(err, Error::NotFound { kind: "query", ref key } if key == "missing"));
        assert_eq!(service.pool.size(), 0);
    }

    #[tokio::test]
    async fn test_malformed_template_fails_before_connecting() {
        let service = service();
        let err = service.execute("broken", &ParameterSet::new()).await.unwrap_err();

        assert!(matches!(err, Error::Template { .. }));
        assert_eq!(service.pool.size(), 0);
    }

    #[tokio::test]
    async fn test_location_is_available_twice() {
        let service = service();
        let params = ParameterSet::new().with("location_uuid", "abc");

        let prepared = service.prepare("visits", &params).unwrap();
        assert_eq!(prepared.sql(), "SELECT * FROM t WHERE loc = ?");
        assert_eq!(prepared.values(), [SqlValue::from("abc")]);

        let prepared = service.prepare("visits.by_location", &params).unwrap();
        assert_eq!(prepared.order(), ["location_uuid", VISIT_LOCATION_UUID]);
        assert_eq!(prepared.values(), [SqlValue::from("abc"), SqlValue::from("abc")]);
    }

    #[tokio::test]
    async fn test_omitted_placeholders_bind_null() {
        let service = service();
        let prepared = service.prepare("visits.by_location", &ParameterSet::new()).unwrap();
        assert_eq!(prepared.values(), [SqlValue::Null, SqlValue::Null]);
    }

    #[tokio::test]
    async fn test_connection_failure_is_wrapped_with_query_id() {
        let service = service();
        let err = service
            .execute("visits", &ParameterSet::new().with("location_uuid", "abc"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::QueryExecution { ref query_id, .. } if query_id == "visits"));
    }
}
