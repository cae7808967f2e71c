//! Collaborators owned by the host platform: locations, visits and the
//! proxy-privilege context of the current caller.

use crate::query::PreparedQuery;
use crate::value::ParameterSet;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::MySqlPool;
use std::collections::HashMap;
use tracing::trace;

/// Privilege names granted temporarily while reading platform data.
pub mod privileges {
    pub const GET_LOCATIONS: &str = "Get Locations";
    pub const GET_GLOBAL_PROPERTIES: &str = "Get Global Properties";
    pub const GET_LOCATION_ATTRIBUTE_TYPES: &str = "Get Location Attribute Types";
}

/// UUID of the location attribute type holding the Master Facility List code.
pub const MFL_CODE_ATTRIBUTE_TYPE: &str = "8a845a89-6aa5-4111-81d3-0af31c45c002";

/// A facility known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Location {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    /// Master Facility List code, if the location carries one
    pub mfl_code: Option<String>,
}

#[async_trait]
pub trait LocationLookup: Send + Sync {
    async fn location(&self, id: i64) -> crate::Result<Option<Location>>;

    /// First location whose MFL code equals `mfl_code`.
    async fn location_by_mfl_code(&self, mfl_code: &str) -> crate::Result<Option<Location>>;
}

/// A patient visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Visit {
    pub id: i64,
    pub patient_id: i64,
    pub started_at: NaiveDateTime,
    /// `None` while the visit is still open
    pub stopped_at: Option<NaiveDateTime>,
}

impl Visit {
    /// Whether the visit overlaps `[start, end]`: it started no later than
    /// `end` and is open or ended no earlier than `start`.
    #[must_use]
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.started_at <= end && self.stopped_at.map_or(true, |stop| stop >= start)
    }
}

#[async_trait]
pub trait VisitLookup: Send + Sync {
    /// Non-voided visits of `patient_id` overlapping `[start, end]`,
    /// ordered by start time ascending.
    async fn visits_overlapping(
        &self,
        patient_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> crate::Result<Vec<Visit>>;
}

/// First and last instant of `date`: `00:00:00` and `23:59:59.999`.
#[must_use]
pub fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).map_or(start, |t| date.and_time(t));
    (start, end)
}

/// Grants and revokes proxy privileges for the current caller.
pub trait PrivilegeContext: Send + Sync {
    fn grant(&self, privilege: &'static str);
    fn revoke(&self, privilege: &'static str);
}

/// Proxy privileges held for a scope. Everything granted in
/// [`ProxyPrivileges::acquire`] is revoked when the guard drops, including on
/// early return and unwinding.
#[must_use = "privileges are revoked as soon as the guard is dropped"]
pub struct ProxyPrivileges<'a> {
    context: &'a dyn PrivilegeContext,
    granted: &'static [&'static str],
}

impl<'a> ProxyPrivileges<'a> {
    pub fn acquire(context: &'a dyn PrivilegeContext, privileges: &'static [&'static str]) -> Self {
        for &privilege in privileges {
            context.grant(privilege);
        }
        trace!(?privileges, "proxy privileges granted");
        Self {
            context,
            granted: privileges,
        }
    }
}

impl Drop for ProxyPrivileges<'_> {
    fn drop(&mut self) {
        for &privilege in self.granted.iter().rev() {
            self.context.revoke(privilege);
        }
        trace!(privileges = ?self.granted, "proxy privileges revoked");
    }
}

/// Counting privilege context for a single process.
///
/// Grants nest: a privilege stays held until it is revoked as many times as
/// it was granted.
#[derive(Debug, Default)]
pub struct ScopedPrivileges {
    held: Mutex<HashMap<&'static str, usize>>,
}

impl ScopedPrivileges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_granted(&self, privilege: &str) -> bool {
        self.held.lock().get(privilege).is_some_and(|n| *n > 0)
    }

    /// Number of distinct privileges currently held.
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.lock().values().filter(|n| **n > 0).count()
    }
}

impl PrivilegeContext for ScopedPrivileges {
    fn grant(&self, privilege: &'static str) {
        *self.held.lock().entry(privilege).or_insert(0) += 1;
    }

    fn revoke(&self, privilege: &'static str) {
        let mut held = self.held.lock();
        if let Some(n) = held.get_mut(privilege) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                held.remove(privilege);
            }
        }
    }
}

const SELECT_LOCATION: &str = "SELECT l.location_id AS id, l.uuid, l.name, a.value_reference AS mfl_code
    FROM location l
    LEFT JOIN location_attribute a ON a.location_id = l.location_id AND a.voided = 0
        AND a.attribute_type_id = (SELECT location_attribute_type_id FROM location_attribute_type
            WHERE uuid = :mfl_attribute_type)
    WHERE l.location_id = :location_id";

const SELECT_LOCATION_BY_MFL: &str = "SELECT l.location_id AS id, l.uuid, l.name, a.value_reference AS mfl_code
    FROM location l
    JOIN location_attribute a ON a.location_id = l.location_id AND a.voided = 0
    JOIN location_attribute_type t ON t.location_attribute_type_id = a.attribute_type_id
    WHERE t.uuid = :mfl_attribute_type AND a.value_reference = :mfl_code AND l.retired = 0
    ORDER BY l.location_id
    LIMIT 1";

const SELECT_VISITS: &str = "SELECT visit_id AS id, patient_id, date_started AS started_at,
        date_stopped AS stopped_at
    FROM visit
    WHERE patient_id = :patient_id AND voided = 0
        AND date_started <= :end
        AND (date_stopped IS NULL OR date_stopped >= :start)
    ORDER BY date_started ASC, visit_id ASC";

/// Location and visit lookups against the platform's own tables.
#[derive(Debug, Clone)]
pub struct MySqlHost {
    pool: MySqlPool,
}

impl MySqlHost {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocationLookup for MySqlHost {
    async fn location(&self, id: i64) -> crate::Result<Option<Location>> {
        let params = ParameterSet::new()
            .with("location_id", id)
            .with("mfl_attribute_type", MFL_CODE_ATTRIBUTE_TYPE);
        PreparedQuery::new(SELECT_LOCATION, &params)?
            .fetch_optional_as(&self.pool)
            .await
    }

    async fn location_by_mfl_code(&self, mfl_code: &str) -> crate::Result<Option<Location>> {
        let params = ParameterSet::new()
            .with("mfl_code", mfl_code)
            .with("mfl_attribute_type", MFL_CODE_ATTRIBUTE_TYPE);
        PreparedQuery::new(SELECT_LOCATION_BY_MFL, &params)?
            .fetch_optional_as(&self.pool)
            .await
    }
}

#[async_trait]
impl VisitLookup for MySqlHost {
    async fn visits_overlapping(
        &self,
        patient_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> crate::Result<Vec<Visit>> {
        let params = ParameterSet::new()
            .with("patient_id", patient_id)
            .with("start", start)
            .with("end", end);
        PreparedQuery::new(SELECT_VISITS, &params)?
            .fetch_all_as(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SqlValue;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let (start, end) = day_bounds(date);
        assert_eq!(start.to_string(), "2024-03-05 00:00:00");
        assert_eq!(end.to_string(), "2024-03-05 23:59:59.999");
    }

    #[test]
    fn test_visit_overlap() {
        let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        let visit = |from: NaiveDateTime, to: Option<NaiveDateTime>| Visit {
            id: 1,
            patient_id: 7,
            started_at: from,
            stopped_at: to,
        };

        assert!(visit(at("2024-03-05", "08:00:00"), Some(at("2024-03-05", "09:00:00"))).overlaps(start, end));
        assert!(visit(at("2024-03-04", "22:00:00"), Some(at("2024-03-05", "01:00:00"))).overlaps(start, end));
        assert!(visit(at("2024-03-01", "08:00:00"), None).overlaps(start, end));
        assert!(!visit(at("2024-03-04", "08:00:00"), Some(at("2024-03-04", "23:59:59"))).overlaps(start, end));
        assert!(!visit(at("2024-03-06", "00:00:00"), None).overlaps(start, end));
    }

    #[test]
    fn test_guard_revokes_on_drop() {
        let ctx = ScopedPrivileges::new();
        {
            let _guard = ProxyPrivileges::acquire(
                &ctx,
                &[privileges::GET_LOCATIONS, privileges::GET_GLOBAL_PROPERTIES],
            );
            assert!(ctx.is_granted(privileges::GET_LOCATIONS));
            assert!(ctx.is_granted(privileges::GET_GLOBAL_PROPERTIES));
        }
        assert_eq!(ctx.held(), 0);
    }

    #[test]
    fn test_nested_guards() {
        let ctx = ScopedPrivileges::new();
        let outer = ProxyPrivileges::acquire(&ctx, &[privileges::GET_LOCATIONS]);
        {
            let _inner = ProxyPrivileges::acquire(&ctx, &[privileges::GET_LOCATIONS]);
        }
        assert!(ctx.is_granted(privileges::GET_LOCATIONS));
        drop(outer);
        assert!(!ctx.is_granted(privileges::GET_LOCATIONS));
    }

    #[test]
    fn test_guard_revokes_on_early_return() {
        fn lookup(ctx: &ScopedPrivileges, fail: bool) -> Result<(), ()> {
            let _guard = ProxyPrivileges::acquire(ctx, &[privileges::GET_LOCATION_ATTRIBUTE_TYPES]);
            if fail {
                return Err(());
            }
            Ok(())
        }

        let ctx = ScopedPrivileges::new();
        assert!(lookup(&ctx, true).is_err());
        assert_eq!(ctx.held(), 0);
    }

    #[test]
    fn test_lookup_statements_bind() {
        let params = ParameterSet::new()
            .with("patient_id", 7)
            .with("start", at("2024-03-05", "00:00:00"))
            .with("end", at("2024-03-05", "23:59:59"));
        let query = PreparedQuery::new(SELECT_VISITS, &params).unwrap();
        assert_eq!(query.order(), ["patient_id", "end", "start"]);
        assert_eq!(query.values()[0], SqlValue::Int(7));

        let by_mfl = PreparedQuery::new(SELECT_LOCATION_BY_MFL, &ParameterSet::new()).unwrap();
        assert_eq!(by_mfl.order(), ["mfl_attribute_type", "mfl_code"]);
    }
}
