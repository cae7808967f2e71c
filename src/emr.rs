//! The EMR service facade: query search, identifier provisioning and
//! minting, default facility lookups, visits and SMS.

use crate::config::{keys, ConfigProvider};
use crate::error::Error;
use crate::host::{
    day_bounds, privileges, Location, LocationLookup, PrivilegeContext, ProxyPrivileges, Visit,
    VisitLookup,
};
use crate::identifier::{
    IdentifierSourceConfig, IdentifierType, LuhnModNValidator, SequenceStore,
    SequentialIdentifierGenerator, SourceRequest, MOD10_BASE,
};
use crate::registry::QueryRegistry;
use crate::row::ResultRow;
use crate::service::QueryService;
use crate::setup::SetupState;
use crate::sms::{SmsClient, SmsDelivery, SmsSettings};
use crate::value::ParameterSet;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const MRN_SOURCE_NAME: &str = "Kenya EMR - OpenMRS Medical Record Number";
pub const UPN_SOURCE_NAME: &str = "Kenya EMR - OpenMRS HIV Unique Patient Number";

/// Prefix of every medical record number.
pub const MRN_PREFIX: &str = "M";

/// Comment recorded with a unique patient number when the caller gives none.
pub const DEFAULT_UPN_COMMENT: &str = "KenyaEMR Service";

/// The two identifier types the service provisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierTypes {
    /// Medical record number, checked with Luhn mod 30
    pub medical_record_number: IdentifierType,
    /// HIV unique patient number
    pub unique_patient_number: IdentifierType,
}

impl IdentifierTypes {
    /// The platform's stock identifier types.
    ///
    /// # Errors
    ///
    /// Never fails in practice; see [`LuhnModNValidator::mod30`].
    pub fn standard() -> crate::Result<Self> {
        Ok(Self {
            medical_record_number: IdentifierType::new("dfacd928-0370-4315-99d7-6ec1c9f7ae76", "OpenMRS ID")
                .with_validator(LuhnModNValidator::mod30()?),
            unique_patient_number: IdentifierType::new(
                "05ee9cf4-7242-4a17-b4d4-00f707265c8a",
                "Unique Patient Number",
            ),
        })
    }
}

/// Platform services the facade delegates to.
#[derive(Clone)]
pub struct HostServices {
    pub locations: Arc<dyn LocationLookup>,
    pub visits: Arc<dyn VisitLookup>,
    pub privileges: Arc<dyn PrivilegeContext>,
    pub config: Arc<dyn ConfigProvider>,
}

pub struct EmrService<R, S> {
    queries: QueryService<R>,
    identifiers: SequentialIdentifierGenerator<S>,
    identifier_types: IdentifierTypes,
    host: HostServices,
    setup: SetupState,
}

impl<R: QueryRegistry, S: SequenceStore> EmrService<R, S> {
    pub fn new(
        queries: QueryService<R>,
        identifiers: SequentialIdentifierGenerator<S>,
        identifier_types: IdentifierTypes,
        host: HostServices,
    ) -> Self {
        Self {
            queries,
            identifiers,
            identifier_types,
            host,
            setup: SetupState::new(),
        }
    }

    #[must_use]
    pub fn queries(&self) -> &QueryService<R> {
        &self.queries
    }

    #[must_use]
    pub fn identifiers(&self) -> &SequentialIdentifierGenerator<S> {
        &self.identifiers
    }

    #[must_use]
    pub fn identifier_types(&self) -> &IdentifierTypes {
        &self.identifier_types
    }

    /// Runs a registered query. See [`QueryService::execute`].
    ///
    /// # Errors
    ///
    /// As [`QueryService::execute`].
    pub async fn search(&self, query_id: &str, params: &ParameterSet) -> crate::Result<Vec<ResultRow>> {
        self.queries.execute(query_id, params).await
    }

    /// Whether first-run setup is still needed: a default location and both
    /// identifier sources must exist.
    ///
    /// Once this has returned `false` it keeps returning `false` without
    /// checking again.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures while setup is still outstanding.
    pub async fn is_setup_required(&self) -> crate::Result<bool> {
        if self.setup.is_complete() {
            return Ok(false);
        }

        let location = self.default_location().await?.is_some();
        let mrn = self
            .identifiers
            .source(&self.identifier_types.medical_record_number)
            .await?
            .is_some();
        let upn = self
            .identifiers
            .source(&self.identifier_types.unique_patient_number)
            .await?
            .is_some();
        debug!(location, mrn, upn, "checked setup state");

        if location && mrn && upn {
            self.setup.complete();
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Provisions the medical record number source: prefix `M`, alphabet
    /// and first value from the type's validator unless `start_from` is given.
    ///
    /// # Errors
    ///
    /// As [`SequentialIdentifierGenerator::provision`].
    pub async fn setup_mrn_identifier_source(&self, start_from: Option<&str>) -> crate::Result<IdentifierSourceConfig> {
        let mut request = SourceRequest::new(MRN_SOURCE_NAME).prefix(MRN_PREFIX);
        if let Some(first) = start_from {
            request = request.first_value(first);
        }
        self.identifiers
            .provision(&self.identifier_types.medical_record_number, request)
            .await
    }

    /// Provisions the HIV unique patient number source: decimal digits, no
    /// prefix.
    ///
    /// # Errors
    ///
    /// As [`SequentialIdentifierGenerator::provision`]; `start_from` is
    /// required because the type has no validator.
    pub async fn setup_hiv_unique_identifier_source(
        &self,
        start_from: Option<&str>,
    ) -> crate::Result<IdentifierSourceConfig> {
        let mut request = SourceRequest::new(UPN_SOURCE_NAME).base_character_set(MOD10_BASE);
        if let Some(first) = start_from {
            request = request.first_value(first);
        }
        self.identifiers
            .provision(&self.identifier_types.unique_patient_number, request)
            .await
    }

    /// Mints the next HIV unique patient number: the default facility's MFL
    /// code followed by the next sequence value.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] if there is no default location or it has no MFL code.
    /// * [`Error::NotFound`] if the source was never provisioned.
    /// * [`Error::Capacity`] once the source is exhausted.
    pub async fn next_hiv_unique_patient_number(&self, comment: Option<&str>) -> crate::Result<String> {
        let comment = comment.unwrap_or(DEFAULT_UPN_COMMENT);
        let mfl_code = self
            .default_location_mfl_code()
            .await?
            .ok_or_else(|| Error::Config("default location has no MFL code".into()))?;

        let sequence = self
            .identifiers
            .mint_next_for(&self.identifier_types.unique_patient_number)
            .await?;
        let upn = format!("{mfl_code}{sequence}");
        info!(%upn, comment, "issued unique patient number");
        Ok(upn)
    }

    /// The facility this installation runs at, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured value is not a location id.
    pub async fn default_location(&self) -> crate::Result<Option<Location>> {
        let _privileges = ProxyPrivileges::acquire(
            self.host.privileges.as_ref(),
            &[privileges::GET_LOCATIONS, privileges::GET_GLOBAL_PROPERTIES],
        );

        let Some(value) = self.host.config.get(keys::DEFAULT_LOCATION) else {
            return Ok(None);
        };
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        let id: i64 = value
            .parse()
            .map_err(|_| Error::Config(format!("default location '{value}' is not a location id")))?;
        self.host.locations.location(id).await
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is read-only.
    pub fn set_default_location(&self, location: &Location) -> crate::Result<()> {
        self.host
            .config
            .set(keys::DEFAULT_LOCATION, &location.id.to_string())?;
        info!(location = %location.name, id = location.id, "default location changed");
        Ok(())
    }

    /// MFL code of the default location.
    ///
    /// # Errors
    ///
    /// As [`Self::default_location`].
    pub async fn default_location_mfl_code(&self) -> crate::Result<Option<String>> {
        let _privileges = ProxyPrivileges::acquire(
            self.host.privileges.as_ref(),
            &[privileges::GET_LOCATION_ATTRIBUTE_TYPES],
        );
        Ok(self.default_location().await?.and_then(|l| l.mfl_code))
    }

    /// # Errors
    ///
    /// Propagates lookup failures.
    pub async fn location_by_mfl_code(&self, mfl_code: &str) -> crate::Result<Option<Location>> {
        self.host.locations.location_by_mfl_code(mfl_code).await
    }

    /// Visits of `patient_id` overlapping `date`, earliest first.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures.
    pub async fn visits_by_patient_and_day(&self, patient_id: i64, date: NaiveDate) -> crate::Result<Vec<Visit>> {
        let (start, end) = day_bounds(date);
        let mut visits = self
            .host
            .visits
            .visits_overlapping(patient_id, start, end)
            .await?;
        visits.sort_by_key(|v| v.started_at);
        Ok(visits)
    }

    /// Sends an SMS through the configured gateway.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the gateway is not configured and
    /// [`Error::Sms`] on transport failure.
    pub async fn send_sms(&self, recipient: &str, message: &str) -> crate::Result<SmsDelivery> {
        let settings = SmsSettings::from_config(self.host.config.as_ref())?;
        SmsClient::new(settings)?.send(recipient, message).await
    }

    /// Lab results per encounter between two visit dates.
    ///
    /// # Errors
    ///
    /// See [`crate::reports::lab_results`].
    pub async fn lab_results(&self, start: NaiveDate, end: NaiveDate) -> crate::Result<BTreeMap<i64, String>> {
        crate::reports::lab_results(self.queries.pool(), start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;
    use crate::host::ScopedPrivileges;
    use crate::identifier::{is_valid, InMemorySequenceStore};
    use crate::registry::StaticQueryRegistry;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use parking_lot::Mutex;
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;

    struct Locations {
        all: Vec<Location>,
        privileges: Arc<ScopedPrivileges>,
        seen_privileges: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl LocationLookup for Locations {
        async fn location(&self, id: i64) -> crate::Result<Option<Location>> {
            self.seen_privileges.lock().push(
                self.privileges.is_granted(privileges::GET_LOCATIONS)
                    && self.privileges.is_granted(privileges::GET_GLOBAL_PROPERTIES),
            );
            Ok(self.all.iter().find(|l| l.id == id).cloned())
        }

        async fn location_by_mfl_code(&self, mfl_code: &str) -> crate::Result<Option<Location>> {
            Ok(self
                .all
                .iter()
                .find(|l| l.mfl_code.as_deref() == Some(mfl_code))
                .cloned())
        }
    }

    struct Visits(Vec<Visit>);

    #[async_trait]
    impl VisitLookup for Visits {
        async fn visits_overlapping(
            &self,
            patient_id: i64,
            start: NaiveDateTime,
            end: NaiveDateTime,
        ) -> crate::Result<Vec<Visit>> {
            Ok(self
                .0
                .iter()
                .filter(|v| v.patient_id == patient_id && v.overlaps(start, end))
                .cloned()
                .collect())
        }
    }

    struct Fixture {
        service: EmrService<StaticQueryRegistry, InMemorySequenceStore>,
        config: Arc<StaticConfig>,
        privileges: Arc<ScopedPrivileges>,
        locations: Arc<Locations>,
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn facility(id: i64, mfl_code: Option<&str>) -> Location {
        Location {
            id,
            uuid: format!("loc-{id}"),
            name: format!("Facility {id}"),
            mfl_code: mfl_code.map(str::to_owned),
        }
    }

    fn fixture() -> Fixture {
        let config = Arc::new(StaticConfig::new());
        let privileges = Arc::new(ScopedPrivileges::new());
        let locations = Arc::new(Locations {
            all: vec![facility(1, Some("15204")), facility(2, None)],
            privileges: Arc::clone(&privileges),
            seen_privileges: Mutex::new(Vec::new()),
        });
        let visit = |id, from, to: Option<&str>| Visit {
            id,
            patient_id: 7,
            started_at: at(from),
            stopped_at: to.map(at),
        };
        let visits = Arc::new(Visits(vec![
            visit(3, "2024-03-05 14:00:00", None),
            visit(2, "2024-03-04 22:00:00", Some("2024-03-05 02:00:00")),
            visit(1, "2024-03-03 08:00:00", Some("2024-03-03 09:00:00")),
            visit(4, "2024-03-05 09:00:00", Some("2024-03-05 10:00:00")),
        ]));

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("mysql://nobody@127.0.0.1:1/none")
            .unwrap();
        let registry = StaticQueryRegistry::new().register("visits", "SELECT * FROM visit WHERE location = :location_uuid");

        let service = EmrService::new(
            QueryService::new(registry, pool),
            SequentialIdentifierGenerator::new(InMemorySequenceStore::new()),
            IdentifierTypes::standard().unwrap(),
            HostServices {
                locations: Arc::clone(&locations) as Arc<dyn LocationLookup>,
                visits,
                privileges: Arc::clone(&privileges) as Arc<dyn PrivilegeContext>,
                config: Arc::clone(&config) as Arc<dyn ConfigProvider>,
            },
        );

        Fixture {
            service,
            config,
            privileges,
            locations,
        }
    }

    #[tokio::test]
    async fn test_default_location_under_privileges() {
        let f = fixture();
        assert_eq!(f.service.default_location().await.unwrap(), None);

        f.service.set_default_location(&facility(1, Some("15204"))).unwrap();
        assert_eq!(f.config.get(keys::DEFAULT_LOCATION).as_deref(), Some("1"));

        let location = f.service.default_location().await.unwrap().unwrap();
        assert_eq!(location.id, 1);
        assert_eq!(*f.locations.seen_privileges.lock(), [true]);
        assert_eq!(f.privileges.held(), 0);
    }

    #[tokio::test]
    async fn test_default_location_rejects_garbage() {
        let f = fixture();
        f.config.set(keys::DEFAULT_LOCATION, "main").unwrap();
        assert!(matches!(f.service.default_location().await, Err(Error::Config(_))));
        assert_eq!(f.privileges.held(), 0);
    }

    #[tokio::test]
    async fn test_mfl_code_lookups() {
        let f = fixture();
        assert_eq!(f.service.default_location_mfl_code().await.unwrap(), None);

        f.config.set(keys::DEFAULT_LOCATION, "1").unwrap();
        assert_eq!(f.service.default_location_mfl_code().await.unwrap().as_deref(), Some("15204"));
        assert_eq!(f.privileges.held(), 0);

        let found = f.service.location_by_mfl_code("15204").await.unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert_eq!(f.service.location_by_mfl_code("99999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_setup_required_until_complete_then_sticky() {
        let f = fixture();
        assert!(f.service.is_setup_required().await.unwrap());

        f.config.set(keys::DEFAULT_LOCATION, "1").unwrap();
        f.service.setup_mrn_identifier_source(None).await.unwrap();
        assert!(f.service.is_setup_required().await.unwrap());

        f.service.setup_hiv_unique_identifier_source(Some("1")).await.unwrap();
        assert!(!f.service.is_setup_required().await.unwrap());

        f.config.set(keys::DEFAULT_LOCATION, "").unwrap();
        assert!(!f.service.is_setup_required().await.unwrap());
    }

    #[tokio::test]
    async fn test_mrn_source() {
        let f = fixture();
        let config = f.service.setup_mrn_identifier_source(None).await.unwrap();
        assert_eq!(config.name, MRN_SOURCE_NAME);
        assert_eq!(config.prefix.as_deref(), Some("M"));
        assert_eq!(config.description, "Identifier Generator for OpenMRS ID");

        let mrn = f
            .service
            .identifiers()
            .mint_next_for(&f.service.identifier_types().medical_record_number)
            .await
            .unwrap();
        assert!(mrn.starts_with('M'));
        assert!(is_valid(&config.base_character_set, &mrn));

        let again = f.service.setup_mrn_identifier_source(None).await;
        assert!(matches!(again, Err(Error::AlreadyProvisioned(ref name)) if name == "OpenMRS ID"));
    }

    #[tokio::test]
    async fn test_upn_source_needs_start_value() {
        let f = fixture();
        let err = f.service.setup_hiv_unique_identifier_source(None).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_next_unique_patient_number() {
        let f = fixture();
        f.config.set(keys::DEFAULT_LOCATION, "1").unwrap();
        f.service.setup_hiv_unique_identifier_source(Some("00001")).await.unwrap();

        assert_eq!(f.service.next_hiv_unique_patient_number(None).await.unwrap(), "1520400001");
        assert_eq!(
            f.service.next_hiv_unique_patient_number(Some("enrollment")).await.unwrap(),
            "1520400002"
        );
        assert_eq!(f.privileges.held(), 0);
    }

    #[test]
    fn test_default_upn_comment() {
        assert_eq!(DEFAULT_UPN_COMMENT, "KenyaEMR Service");
    }

    #[tokio::test]
    async fn test_unique_patient_number_needs_mfl_code() {
        let f = fixture();
        f.config.set(keys::DEFAULT_LOCATION, "2").unwrap();
        f.service.setup_hiv_unique_identifier_source(Some("1")).await.unwrap();
        assert!(matches!(
            f.service.next_hiv_unique_patient_number(None).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_visits_for_day_in_start_order() {
        let f = fixture();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let visits = f.service.visits_by_patient_and_day(7, date).await.unwrap();
        let ids: Vec<i64> = visits.iter().map(|v| v.id).collect();
        assert_eq!(ids, [2, 4, 3]);

        assert!(f.service.visits_by_patient_and_day(8, date).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_unknown_query() {
        let f = fixture();
        let err = f.service.search("nope", &ParameterSet::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "query", .. }));
    }

    #[tokio::test]
    async fn test_sms_requires_gateway_config() {
        let f = fixture();
        let err = f.service.send_sms("+254700000000", "hi").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
