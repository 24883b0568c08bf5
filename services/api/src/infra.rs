use clap::ValueEnum;
use metrics_exporter_prometheus::PrometheusHandle;
use rental_intake::workflows::applications::{
    Application, ApplicationId, ApplicationRepository, CaptureOutcome, CaptureRequest,
    ListingDirectory, ListingId, ListingSnapshot, Notification, NotificationError,
    NotificationPublisher, PaymentGateway, RepositoryError,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{what} lock poisoned")))
}

/// Process-local application store. Writes are a compare-and-swap on the stored revision.
#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = lock(&self.records, "repository")?;
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Duplicate(application.id));
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update(
        &self,
        mut application: Application,
        expected_revision: u64,
    ) -> Result<Application, RepositoryError> {
        let mut guard = lock(&self.records, "repository")?;
        let stored_revision = guard
            .get(&application.id)
            .map(|stored| stored.revision)
            .ok_or_else(|| RepositoryError::NotFound(application.id.clone()))?;
        if stored_revision != expected_revision {
            return Err(RepositoryError::Conflict(application.id));
        }
        application.revision = expected_revision + 1;
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = lock(&self.records, "repository")?;
        Ok(guard.get(id).cloned())
    }
}

/// Logs every notification and keeps a copy for the demo transcript.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            template = %notification.template,
            application_id = %notification.application_id,
            "notification dispatched"
        );
        let mut guard = self
            .events
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?;
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Fixed listing catalogue standing in for the external listing service.
#[derive(Default, Clone)]
pub(crate) struct StaticListingDirectory {
    listings: HashMap<ListingId, ListingSnapshot>,
}

impl StaticListingDirectory {
    pub(crate) fn with_listing(mut self, listing: ListingSnapshot) -> Self {
        self.listings.insert(listing.listing_id.clone(), listing);
        self
    }

    pub(crate) fn sample() -> Self {
        Self::default()
            .with_listing(listing("listing-ca-101", "CA", 2400, 45))
            .with_listing(listing("listing-ny-220", "NY", 3100, 20))
            .with_listing(listing("listing-tx-305", "TX", 1650, 55))
    }
}

fn listing(id: &str, state_code: &str, monthly_rent: u32, application_fee: u32) -> ListingSnapshot {
    ListingSnapshot {
        listing_id: ListingId(id.to_string()),
        state_code: state_code.to_string(),
        monthly_rent,
        application_fee,
    }
}

impl ListingDirectory for StaticListingDirectory {
    fn listing(&self, id: &ListingId) -> Result<Option<ListingSnapshot>, RepositoryError> {
        Ok(self.listings.get(id).cloned())
    }
}

/// Outcome the simulated gateway reports for every capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum SimulatedOutcome {
    #[default]
    Decline,
    Capture,
    Pending,
}

/// Stand-in for a card processor. No money moves.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SimulatedPaymentGateway {
    outcome: SimulatedOutcome,
}

impl SimulatedPaymentGateway {
    pub(crate) fn new(outcome: SimulatedOutcome) -> Self {
        Self { outcome }
    }
}

impl PaymentGateway for SimulatedPaymentGateway {
    fn capture(&self, request: &CaptureRequest) -> CaptureOutcome {
        info!(
            application_id = %request.application_id,
            reference_id = %request.reference_id,
            amount = request.amount,
            outcome = ?self.outcome,
            "simulated payment capture"
        );
        match self.outcome {
            SimulatedOutcome::Decline => CaptureOutcome::Declined {
                message: "payment processor unavailable; submit a manual payment for verification"
                    .to_string(),
            },
            SimulatedOutcome::Capture => CaptureOutcome::Captured,
            SimulatedOutcome::Pending => CaptureOutcome::Pending,
        }
    }
}
