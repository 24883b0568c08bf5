use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Application, ApplicationId, ListingId};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// `update` is a compare-and-swap on [`Application::revision`]: the write only lands when the
/// stored revision equals `expected_revision`, and the stored copy comes back with the revision
/// bumped. The status, history, ledger, and signatures travel in the same record so they are
/// committed together.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn update(
        &self,
        application: Application,
        expected_revision: u64,
    ) -> Result<Application, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("application {0} already exists")]
    Duplicate(ApplicationId),
    #[error("application {0} was modified concurrently")]
    Conflict(ApplicationId),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read-only listing facts the lifecycle needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub listing_id: ListingId,
    /// Free-text two-letter jurisdiction code, e.g. `CA`.
    pub state_code: String,
    pub monthly_rent: u32,
    pub application_fee: u32,
}

/// Lookup into the external listing catalogue.
pub trait ListingDirectory: Send + Sync {
    fn listing(&self, id: &ListingId) -> Result<Option<ListingSnapshot>, RepositoryError>;
}

/// Outbound fire-and-forget signal for status changes and signature completion.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub application_id: ApplicationId,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(template: impl Into<String>, application_id: ApplicationId) -> Self {
        Self {
            template: template.into(),
            application_id,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Time source, injected so lifecycle timestamps are reproducible under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
