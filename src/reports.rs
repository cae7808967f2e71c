//! Fixed report queries evaluated through the named-parameter binder.

use crate::query::PreparedQuery;
use crate::value::ParameterSet;
use chrono::NaiveDate;
use sqlx::{Executor, MySql};
use std::collections::BTreeMap;
use tracing::debug;

/// Lab results per OPD encounter. Panel tests (concept sets) list each member
/// as `test|result`, comma separated; single tests report the bare result.
const LAB_RESULTS: &str = "SELECT le.encounter_id,
    CAST(IF(le.lab_test IN (SELECT concept_set FROM openmrs.concept_set),
        GROUP_CONCAT(CONCAT(COALESCE(le.result_test_name, '-'), '|', le.result_name) SEPARATOR ', '),
        le.result_name) AS CHAR) AS test_result
FROM kenyaemr_etl.etl_laboratory_extract le
INNER JOIN kenyaemr_etl.etl_patient_demographics p ON p.patient_id = le.patient_id AND p.voided = 0
WHERE DATE(le.visit_date) BETWEEN DATE(:startDate) AND DATE(:endDate)
GROUP BY le.encounter_id";

#[derive(Debug, sqlx::FromRow)]
struct LabResultRow {
    encounter_id: i64,
    test_result: Option<String>,
}

fn lab_results_query(start: NaiveDate, end: NaiveDate) -> crate::Result<PreparedQuery> {
    let params = ParameterSet::new()
        .with("startDate", start)
        .with("endDate", end);
    PreparedQuery::new(LAB_RESULTS, &params)
}

/// Lab results recorded between `start` and `end` (inclusive, by visit
/// date), keyed by encounter id.
///
/// Encounters whose result is NULL are left out.
///
/// # Errors
///
/// Returns [`crate::Error::Database`] if the query fails.
pub async fn lab_results<'e, E>(
    executor: E,
    start: NaiveDate,
    end: NaiveDate,
) -> crate::Result<BTreeMap<i64, String>>
where
    E: Executor<'e, Database = MySql>,
{
    let rows: Vec<LabResultRow> = lab_results_query(start, end)?
        .fetch_all_as(executor)
        .await?;
    debug!(rows = rows.len(), %start, %end, "evaluated lab results");

    Ok(rows
        .into_iter()
        .filter_map(|row| row.test_result.map(|result| (row.encounter_id, result)))
        .collect())
}
