use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::audit::{export_csv, AuditEvent, Comment};
use super::cache::{CacheSettings, StatusViewCache};
use super::domain::{
    Actor, ApplicantDetails, Application, ApplicationId, ApplicationStatus, ApplicationStatusView,
    ListingId, Role, StatusHistoryEntry,
};
use super::engine::{StatusTransitionEngine, TransitionRequest};
use super::error::LifecycleError;
use super::payments::{
    new_reference, CaptureRequest, PaymentAttempt, PaymentGateway, PaymentVerification,
    VerificationRequest,
};
use super::repository::{
    ApplicationRepository, Clock, ListingDirectory, ListingSnapshot, Notification,
    NotificationPublisher, SystemClock,
};
use super::requirements::ConditionalRequirement;
use super::scoring::{ScoreBreakdown, ScoringConfig, ScoringEngine};
use super::transitions::TransitionTable;
use crate::config::LifecycleConfig;
use crate::workflows::lease::{
    DisclosureRegistry, LeaseDraft, LeaseDraftStore, LeaseSignatureStatus,
    LeaseSigningStateMachine, SignatureSubmission, SigningContext, SigningOrder, SigningParty,
};

/// Orchestrates the lifecycle core over the persistence, listing, and notification seams.
///
/// Every mutation follows the same shape: read the record, change a copy, then write it back
/// with the revision that was read. A concurrent writer makes the write fail with
/// [`LifecycleError::Conflict`]; nothing is retried here.
pub struct ApplicationLifecycleService<R, N, L> {
    repository: Arc<R>,
    notifications: Arc<N>,
    listings: Arc<L>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    engine: StatusTransitionEngine,
    scoring: ScoringEngine,
    signing: LeaseSigningStateMachine,
    cache: StatusViewCache,
    drafts: LeaseDraftStore,
    config: LifecycleConfig,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

fn require_reviewer(actor: &Actor, action: &str) -> Result<(), LifecycleError> {
    if actor.role.is_reviewer() {
        Ok(())
    } else {
        Err(LifecycleError::unauthorized(actor.role, action))
    }
}

fn require_owner(
    application: &Application,
    actor: &Actor,
    action: &str,
) -> Result<(), LifecycleError> {
    if actor.role == Role::Applicant && application.is_owned_by(actor) {
        Ok(())
    } else {
        Err(LifecycleError::unauthorized(actor.role, action))
    }
}

impl<R, N, L> ApplicationLifecycleService<R, N, L>
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifications: Arc<N>,
        listings: Arc<L>,
        gateway: Arc<dyn PaymentGateway>,
        scoring: ScoringConfig,
        config: LifecycleConfig,
    ) -> Self {
        let cache = StatusViewCache::new(CacheSettings {
            ttl_secs: config.cache_ttl_secs,
            capacity: config.cache_capacity,
        });
        let signing = LeaseSigningStateMachine::new(
            SigningOrder::default(),
            DisclosureRegistry::standard(),
            config.min_signature_bytes,
        );

        Self {
            repository,
            notifications,
            listings,
            gateway,
            clock: Arc::new(SystemClock),
            engine: StatusTransitionEngine::default(),
            scoring: ScoringEngine::new(scoring),
            signing,
            cache,
            drafts: LeaseDraftStore::new(),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_transition_table(mut self, table: TransitionTable) -> Self {
        self.engine = StatusTransitionEngine::new(table);
        self
    }

    pub fn with_signing(mut self, order: SigningOrder, registry: DisclosureRegistry) -> Self {
        self.signing =
            LeaseSigningStateMachine::new(order, registry, self.config.min_signature_bytes);
        self
    }

    pub fn engine(&self) -> &StatusTransitionEngine {
        &self.engine
    }

    pub fn signing(&self) -> &LeaseSigningStateMachine {
        &self.signing
    }

    pub fn cache(&self) -> &StatusViewCache {
        &self.cache
    }

    /// Open a new draft for the calling applicant.
    pub fn create_application(
        &self,
        actor: &Actor,
        listing_id: ListingId,
        details: ApplicantDetails,
    ) -> Result<Application, LifecycleError> {
        if actor.role != Role::Applicant {
            return Err(LifecycleError::unauthorized(actor.role, "open an application"));
        }
        self.listing(&listing_id)?;

        let now = self.clock.now();
        let expires_at = self.deadline_from(now)?;
        let application = Application::draft(
            next_application_id(),
            actor.id.clone(),
            listing_id,
            details,
            now,
            expires_at,
        );

        let stored = self.repository.insert(application)?;
        info!(application_id = %stored.id, applicant = %stored.applicant_id, "application drafted");
        Ok(stored)
    }

    /// Sanitized status for API responses, served through the side cache. Applicants only see
    /// their own applications.
    pub fn get(
        &self,
        id: &ApplicationId,
        viewer: &Actor,
    ) -> Result<ApplicationStatusView, LifecycleError> {
        let now = self.clock.now();
        let view = match self.cache.get(id, now) {
            Some(view) => view,
            None => {
                let view = self.load(id)?.status_view();
                self.cache.insert(view.clone(), now);
                view
            }
        };
        if viewer.role == Role::Applicant && view.applicant_id != viewer.id {
            return Err(LifecycleError::unauthorized(
                viewer.role,
                "read another applicant's application",
            ));
        }
        Ok(view)
    }

    /// Full record straight from the repository.
    pub fn application(&self, id: &ApplicationId) -> Result<Application, LifecycleError> {
        self.load(id)
    }

    /// Amend applicant details. The stored score breakdown is left as it was.
    pub fn update_details(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        details: ApplicantDetails,
    ) -> Result<Application, LifecycleError> {
        let mut application = self.load(id)?;
        require_owner(&application, actor, "amend another applicant's details")?;
        if !matches!(
            application.status,
            ApplicationStatus::Draft | ApplicationStatus::InfoRequested
        ) {
            return Err(LifecycleError::precondition(format!(
                "details are locked while the application is {}",
                application.status
            )));
        }

        let expected = application.revision;
        application.details = details;
        application.updated_at = self.clock.now();
        self.commit(application, expected)
    }

    pub fn request_transition(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        request: TransitionRequest,
    ) -> Result<Application, LifecycleError> {
        let mut application = self.load(id)?;
        let expected = application.revision;
        let now = self.clock.now();

        let entry = self.engine.apply(&mut application, actor, request, now)?;
        // Payment may have been verified while the application was still a draft.
        let advanced = self.auto_advance(&mut application, now)?;
        let stored = self.commit(application, expected)?;

        info!(
            application_id = %stored.id,
            status = %entry.status,
            actor = %actor.id,
            role = actor.role.label(),
            "application status changed"
        );
        self.publish_status(&stored, &entry);
        for entry in &advanced {
            self.publish_status(&stored, entry);
        }
        Ok(stored)
    }

    /// Recompute and persist the score breakdown. The result is a snapshot.
    pub fn calculate_score(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<ScoreBreakdown, LifecycleError> {
        require_reviewer(actor, "score an application")?;
        let mut application = self.load(id)?;
        self.require_active(&application, "scored")?;
        let listing = self.listing(&application.listing_id)?;

        let breakdown = self
            .scoring
            .calculate(&application.snapshot(listing.monthly_rent));
        let now = self.clock.now();
        let expected = application.revision;
        application.score_breakdown = Some(breakdown.clone());
        application.scored_at = Some(now);
        application.updated_at = now;
        let stored = self.commit(application, expected)?;

        info!(
            application_id = %stored.id,
            total_score = breakdown.total_score,
            max_score = breakdown.max_score,
            flags = breakdown.flags.len(),
            "application scored"
        );
        Ok(breakdown)
    }

    /// Run the automated capture for the listing fee and record the attempt. A decline is
    /// recorded on the ledger and returned as a normal result.
    pub fn submit_payment(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<(Application, PaymentAttempt), LifecycleError> {
        let mut application = self.load(id)?;
        require_owner(&application, actor, "pay for another applicant's application")?;
        if application.status != ApplicationStatus::PendingPayment {
            return Err(LifecycleError::precondition(format!(
                "payments are taken while pending_payment, not {}",
                application.status
            )));
        }
        if application.payments.is_paid() {
            return Err(LifecycleError::AlreadyVerified(application.id.clone()));
        }
        let listing = self.listing(&application.listing_id)?;

        let request = CaptureRequest {
            application_id: application.id.clone(),
            reference_id: new_reference("PAY"),
            amount: listing.application_fee,
        };
        let outcome = self.gateway.capture(&request);
        let now = self.clock.now();
        let attempt = PaymentAttempt::from_outcome(&request, outcome, now);

        let expected = application.revision;
        application.payments.record_attempt(attempt.clone())?;
        application.updated_at = now;
        let advanced = self.auto_advance(&mut application, now)?;
        let stored = self.commit(application, expected)?;

        info!(
            application_id = %stored.id,
            reference_id = %attempt.reference_id,
            outcome = attempt.status.label(),
            "payment attempt recorded"
        );
        for entry in &advanced {
            self.publish_status(&stored, entry);
        }
        Ok((stored, attempt))
    }

    /// Record a reviewer's manual payment confirmation.
    pub fn verify_payment(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        request: VerificationRequest,
    ) -> Result<PaymentVerification, LifecycleError> {
        require_reviewer(actor, "verify a payment")?;
        let mut application = self.load(id)?;
        let expected = application.revision;
        let now = self.clock.now();

        let application_id = application.id.clone();
        let verification = application
            .payments
            .verify(&application_id, request, &actor.id, now)?
            .clone();
        self.require_active(&application, "verified")?;
        application.updated_at = now;
        let advanced = self.auto_advance(&mut application, now)?;
        let stored = self.commit(application, expected)?;

        info!(
            application_id = %stored.id,
            reference_id = %verification.reference_id,
            verified_by = %actor.id,
            "payment verified"
        );
        for entry in &advanced {
            self.publish_status(&stored, entry);
        }
        Ok(verification)
    }

    pub fn mark_requirement_satisfied(
        &self,
        id: &ApplicationId,
        requirement_id: &str,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<ConditionalRequirement, LifecycleError> {
        require_reviewer(actor, "satisfy a requirement")?;
        let mut application = self.load(id)?;
        let expected = application.revision;
        let now = self.clock.now();

        let changed = application
            .requirements
            .mark_satisfied(requirement_id, &actor.id, notes, now)?;
        let application = if changed {
            application.updated_at = now;
            let stored = self.commit(application, expected)?;
            info!(
                application_id = %stored.id,
                requirement_id,
                outstanding = stored.requirements.outstanding_required(),
                "requirement satisfied"
            );
            stored
        } else {
            application
        };

        application
            .requirements
            .get(requirement_id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(format!("requirement {requirement_id}")))
    }

    pub fn add_comment(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        body: &str,
    ) -> Result<Comment, LifecycleError> {
        require_reviewer(actor, "comment on an application")?;
        let body = body.trim();
        if body.is_empty() {
            return Err(LifecycleError::validation("comment body is empty"));
        }

        let mut application = self.load(id)?;
        let expected = application.revision;
        let now = self.clock.now();
        let comment = Comment {
            author: actor.id.clone(),
            body: body.to_string(),
            created_at: now,
        };
        application.audit.append_comment(comment.clone());
        application.updated_at = now;
        self.commit(application, expected)?;
        Ok(comment)
    }

    /// Merged audit timeline as the viewer is allowed to see it.
    pub fn history(
        &self,
        id: &ApplicationId,
        viewer: &Actor,
    ) -> Result<Vec<AuditEvent>, LifecycleError> {
        let application = self.load(id)?;
        if viewer.role == Role::Applicant {
            require_owner(&application, viewer, "read another applicant's history")?;
        }
        Ok(application.audit.history(&application.payments, viewer.role))
    }

    pub fn export_history_csv(
        &self,
        id: &ApplicationId,
        viewer: &Actor,
    ) -> Result<String, LifecycleError> {
        require_reviewer(viewer, "export application history")?;
        let events = self.history(id, viewer)?;
        let mut buffer = Vec::new();
        export_csv(&events, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Expire the application when its deadline has passed. Returns whether it expired.
    pub fn expire_if_due(&self, id: &ApplicationId) -> Result<bool, LifecycleError> {
        let application = self.load(id)?;
        let now = self.clock.now();
        let due = application.is_active()
            && application
                .expires_at
                .is_some_and(|deadline| deadline <= now);
        if !due {
            return Ok(false);
        }

        self.request_transition(
            id,
            &Actor::system(),
            TransitionRequest::to(ApplicationStatus::Expired)
                .with_reason("application deadline elapsed"),
        )?;
        Ok(true)
    }

    pub fn sign_lease(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        submission: SignatureSubmission,
    ) -> Result<LeaseSignatureStatus, LifecycleError> {
        let mut application = self.load(id)?;
        let listing = self.listing(&application.listing_id)?;
        let expected = application.revision;
        let now = self.clock.now();

        let context = SigningContext {
            application_status: application.status,
            applicant_id: &application.applicant_id,
            state_code: &listing.state_code,
        };
        let status = self
            .signing
            .sign(&mut application.lease, &context, actor, submission, now)?;
        application.updated_at = now;
        let stored = self.commit(application, expected)?;

        if let Some(party) = SigningParty::for_role(actor.role) {
            if let Err(error) = self.drafts.discard(&stored.id, party) {
                warn!(application_id = %stored.id, %error, "failed to discard lease draft");
            }
        }

        info!(
            application_id = %stored.id,
            signer = %actor.id,
            lease_status = status.label(),
            "lease signature recorded"
        );
        if status == LeaseSignatureStatus::Signed {
            self.publish(
                Notification::new("lease_fully_signed", stored.id.clone())
                    .with_detail("jurisdiction", listing.state_code.trim().to_ascii_uppercase()),
            );
        }
        Ok(status)
    }

    /// Autosave a party's in-progress signing form. Never touches the signature state.
    pub fn save_lease_draft(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        draft: LeaseDraft,
    ) -> Result<LeaseDraft, LifecycleError> {
        let (application, party) = self.lease_party(id, actor)?;
        if application.lease.signature_for(party).is_some() {
            return Err(LifecycleError::precondition(format!(
                "the {} has already signed; the draft is closed",
                party.label()
            )));
        }
        Ok(self
            .drafts
            .save(&application.id, party, draft, self.clock.now())?)
    }

    pub fn lease_draft(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<Option<LeaseDraft>, LifecycleError> {
        let (application, party) = self.lease_party(id, actor)?;
        Ok(self.drafts.load(&application.id, party)?)
    }

    fn lease_party(
        &self,
        id: &ApplicationId,
        actor: &Actor,
    ) -> Result<(Application, SigningParty), LifecycleError> {
        let application = self.load(id)?;
        let party = SigningParty::for_role(actor.role)
            .ok_or_else(|| LifecycleError::unauthorized(actor.role, "edit a lease draft"))?;
        if party == SigningParty::Tenant {
            require_owner(&application, actor, "edit another applicant's lease draft")?;
        }
        if application.status != ApplicationStatus::Approved {
            return Err(LifecycleError::precondition(
                "lease drafts are available once the application is approved",
            ));
        }
        Ok((application, party))
    }

    fn load(&self, id: &ApplicationId) -> Result<Application, LifecycleError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| LifecycleError::NotFound(format!("application {id}")))
    }

    fn listing(&self, id: &ListingId) -> Result<ListingSnapshot, LifecycleError> {
        self.listings
            .listing(id)?
            .ok_or_else(|| LifecycleError::NotFound(format!("listing {}", id.0)))
    }

    fn commit(
        &self,
        application: Application,
        expected: u64,
    ) -> Result<Application, LifecycleError> {
        let id = application.id.clone();
        match self.repository.update(application, expected) {
            Ok(stored) => {
                self.cache.invalidate(&id, stored.revision);
                Ok(stored)
            }
            Err(error) => {
                self.cache.invalidate(&id, expected);
                Err(error.into())
            }
        }
    }

    /// Deadline for a new draft, or none when the TTL is zero.
    fn deadline_from(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LifecycleError> {
        let days = self.config.application_ttl_days;
        if days == 0 {
            return Ok(None);
        }
        Duration::try_days(i64::from(days))
            .and_then(|ttl| now.checked_add_signed(ttl))
            .map(Some)
            .ok_or_else(|| {
                LifecycleError::validation(format!(
                    "application ttl of {days} days is out of range"
                ))
            })
    }

    fn require_active(
        &self,
        application: &Application,
        action: &str,
    ) -> Result<(), LifecycleError> {
        if application.is_active() {
            Ok(())
        } else {
            Err(LifecycleError::precondition(format!(
                "application is {} and can no longer be {action}",
                application.status
            )))
        }
    }

    /// Carry a paid application from `pending_payment` to `submitted` as the system actor.
    fn auto_advance(
        &self,
        application: &mut Application,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusHistoryEntry>, LifecycleError> {
        if !self.config.auto_submit_on_payment
            || application.status != ApplicationStatus::PendingPayment
            || !application.payments.is_paid()
        {
            return Ok(Vec::new());
        }

        let system = Actor::system();
        let verified = self.engine.apply(
            application,
            &system,
            TransitionRequest::to(ApplicationStatus::PaymentVerified)
                .with_reason("payment confirmed"),
            now,
        )?;
        let submitted = self.engine.apply(
            application,
            &system,
            TransitionRequest::to(ApplicationStatus::Submitted),
            now,
        )?;
        Ok(vec![verified, submitted])
    }

    fn publish_status(&self, application: &Application, entry: &StatusHistoryEntry) {
        let mut notification =
            Notification::new("application_status_changed", application.id.clone())
                .with_detail("status", entry.status.label())
                .with_detail("changed_by", entry.changed_by.0.clone());
        if let Some(reason) = &entry.reason {
            notification = notification.with_detail("reason", reason.clone());
        }
        self.publish(notification);
    }

    fn publish(&self, notification: Notification) {
        let template = notification.template.clone();
        let application_id = notification.application_id.clone();
        if let Err(error) = self.notifications.publish(notification) {
            warn!(
                %application_id,
                template = %template,
                %error,
                "notification dispatch failed; state change kept"
            );
        }
    }
}
