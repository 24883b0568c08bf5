use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::LifecycleConfig;
use crate::workflows::applications::domain::{
    Actor, ApplicantDetails, Application, ApplicationId, ApplicationStatus, CreditTier,
    DocumentKind, DocumentReference, EmploymentRecord, EmploymentStatus, ListingId,
    RentalHistoryEntry,
};
use crate::workflows::applications::engine::TransitionRequest;
use crate::workflows::applications::payments::{
    CaptureOutcome, CaptureRequest, PaymentGateway, VerificationRequest,
};
use crate::workflows::applications::repository::{
    ApplicationRepository, Clock, ListingDirectory, ListingSnapshot, Notification,
    NotificationError, NotificationPublisher, RepositoryError,
};
use crate::workflows::applications::{
    application_router, ApplicationLifecycleService, ScoringConfig,
};
use crate::workflows::lease::{LeaseSigningStateMachine, SignatureSubmission};

pub(super) type TestService<N = RecordingNotifier> =
    ApplicationLifecycleService<MemoryRepository, N, StaticListings>;

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap()
}

pub(super) fn applicant() -> Actor {
    Actor::applicant("applicant-1")
}

pub(super) fn other_applicant() -> Actor {
    Actor::applicant("applicant-2")
}

pub(super) fn landlord() -> Actor {
    Actor::landlord("landlord-1")
}

pub(super) fn listing_id() -> ListingId {
    ListingId("listing-ca-1".to_string())
}

pub(super) fn listing() -> ListingSnapshot {
    ListingSnapshot {
        listing_id: listing_id(),
        state_code: "CA".to_string(),
        monthly_rent: 2000,
        application_fee: 45,
    }
}

pub(super) fn strong_details() -> ApplicantDetails {
    ApplicantDetails {
        monthly_income: 7000,
        credit_tier: Some(CreditTier::Good),
        rental_history: vec![RentalHistoryEntry {
            address: "18 Harbor Way, Oakland".to_string(),
            landlord_contact: Some("manager@harborway.example".to_string()),
            monthly_rent: 1850,
            months: 30,
            late_payments: 0,
            evicted: false,
        }],
        employment: Some(EmploymentRecord {
            status: EmploymentStatus::Employed,
            employer: Some("Bayline Logistics".to_string()),
            months_employed: 36,
        }),
        documents: vec![
            DocumentReference {
                kind: DocumentKind::GovernmentId,
                storage_key: "docs/applicant-1/id.pdf".to_string(),
            },
            DocumentReference {
                kind: DocumentKind::PayStub,
                storage_key: "docs/applicant-1/paystub.pdf".to_string(),
            },
            DocumentReference {
                kind: DocumentKind::BankStatement,
                storage_key: "docs/applicant-1/bank.pdf".to_string(),
            },
        ],
    }
}

pub(super) fn check_payment(amount: u32) -> VerificationRequest {
    VerificationRequest {
        reference_id: None,
        amount: Some(amount),
        payment_method: Some("check".to_string()),
        received_at: Some(start()),
        internal_note: Some("dropped at leasing office".to_string()),
        confirmed: true,
    }
}

pub(super) fn signature(machine: &LeaseSigningStateMachine, name: &str) -> SignatureSubmission {
    SignatureSubmission {
        signer_name: name.to_string(),
        signature_image_data: format!("data:image/png;base64,{}", "Q".repeat(120)),
        disclosure_acknowledgments: machine
            .registry()
            .required_for("CA")
            .into_iter()
            .map(|disclosure| (disclosure.key.clone(), true))
            .collect(),
        ip_address: Some("198.51.100.4".to_string()),
    }
}

pub(super) struct Fixture<N = RecordingNotifier> {
    pub(super) service: Arc<TestService<N>>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) notifier: Arc<N>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) gateway: Arc<ScriptedGateway>,
}

pub(super) fn fixture() -> Fixture {
    fixture_with(RecordingNotifier::default(), LifecycleConfig::default())
}

pub(super) fn fixture_with<N>(notifier: N, config: LifecycleConfig) -> Fixture<N>
where
    N: NotificationPublisher + 'static,
{
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(notifier);
    let clock = Arc::new(FixedClock::new(start()));
    let gateway = Arc::new(ScriptedGateway::default());
    let service = ApplicationLifecycleService::new(
        repository.clone(),
        notifier.clone(),
        Arc::new(StaticListings::with(listing())),
        gateway.clone(),
        ScoringConfig::default(),
        config,
    )
    .with_clock(clock.clone());

    Fixture {
        service: Arc::new(service),
        repository,
        notifier,
        clock,
        gateway,
    }
}

impl<N> Fixture<N>
where
    N: NotificationPublisher + 'static,
{
    pub(super) fn draft(&self) -> ApplicationId {
        self.service
            .create_application(&applicant(), listing_id(), strong_details())
            .expect("draft created")
            .id
    }

    pub(super) fn pending_payment(&self) -> ApplicationId {
        let id = self.draft();
        self.service
            .request_transition(
                &id,
                &applicant(),
                TransitionRequest::to(ApplicationStatus::PendingPayment),
            )
            .expect("moved to pending payment");
        id
    }

    /// Paid by manual verification, which advances the application to `submitted`.
    pub(super) fn submitted(&self) -> ApplicationId {
        let id = self.pending_payment();
        self.service
            .verify_payment(&id, &landlord(), check_payment(45))
            .expect("payment verified");
        id
    }

    pub(super) fn under_review(&self) -> ApplicationId {
        let id = self.submitted();
        self.service
            .request_transition(
                &id,
                &landlord(),
                TransitionRequest::to(ApplicationStatus::UnderReview),
            )
            .expect("review started");
        id
    }

    pub(super) fn approved(&self) -> ApplicationId {
        let id = self.submitted();
        self.service
            .request_transition(
                &id,
                &landlord(),
                TransitionRequest::to(ApplicationStatus::Approved),
            )
            .expect("approved");
        id
    }

    pub(super) fn stored(&self, id: &ApplicationId) -> Application {
        self.repository
            .fetch(id)
            .expect("fetch succeeds")
            .expect("application stored")
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationRepository for MemoryRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
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
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard
            .get(&application.id)
            .ok_or_else(|| RepositoryError::NotFound(application.id.clone()))?;
        if stored.revision != expected_revision {
            return Err(RepositoryError::Conflict(application.id));
        }
        application.revision = expected_revision + 1;
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

impl MemoryRepository {
    /// Simulate a concurrent writer committing behind the caller's back.
    pub(super) fn bump_revision(&self, id: &ApplicationId) {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if let Some(application) = guard.get_mut(id) {
            application.revision += 1;
        }
    }
}

/// Repository where another writer commits right after every read.
#[derive(Default)]
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
}

impl ApplicationRepository for RacingRepository {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        self.inner.insert(application)
    }

    fn update(
        &self,
        application: Application,
        expected_revision: u64,
    ) -> Result<Application, RepositoryError> {
        self.inner.update(application, expected_revision)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let found = self.inner.fetch(id)?;
        self.inner.bump_revision(id);
        Ok(found)
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _application: Application) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _application: Application,
        _expected_revision: u64,
    ) -> Result<Application, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct StaticListings {
    listings: HashMap<String, ListingSnapshot>,
}

impl StaticListings {
    pub(super) fn with(listing: ListingSnapshot) -> Self {
        let mut listings = HashMap::new();
        listings.insert(listing.listing_id.0.clone(), listing);
        Self { listings }
    }
}

impl ListingDirectory for StaticListings {
    fn listing(&self, id: &ListingId) -> Result<Option<ListingSnapshot>, RepositoryError> {
        Ok(self.listings.get(&id.0).cloned())
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn templates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|notification| notification.template)
            .collect()
    }
}

impl NotificationPublisher for RecordingNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay down".to_string()))
    }
}

pub(super) struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// Gateway replaying queued outcomes, declining once the script runs out.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    outcomes: Mutex<VecDeque<CaptureOutcome>>,
    requests: Mutex<Vec<CaptureRequest>>,
}

impl ScriptedGateway {
    pub(super) fn push(&self, outcome: CaptureOutcome) {
        self.outcomes
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(outcome);
    }

    pub(super) fn requests(&self) -> Vec<CaptureRequest> {
        self.requests.lock().expect("gateway mutex poisoned").clone()
    }
}

impl PaymentGateway for ScriptedGateway {
    fn capture(&self, request: &CaptureRequest) -> CaptureOutcome {
        self.requests
            .lock()
            .expect("gateway mutex poisoned")
            .push(request.clone());
        self.outcomes
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front()
            .unwrap_or(CaptureOutcome::Declined {
                message: "card declined by issuer".to_string(),
            })
    }
}

pub(super) fn router_for<N>(fixture: &Fixture<N>) -> axum::Router
where
    N: NotificationPublisher + 'static,
{
    application_router(fixture.service.clone())
}

pub(super) fn actor_headers(actor: &Actor) -> BTreeMap<&'static str, String> {
    let mut headers = BTreeMap::new();
    headers.insert("x-actor-id", actor.id.0.clone());
    headers.insert("x-actor-role", actor.role.label().to_string());
    headers
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
