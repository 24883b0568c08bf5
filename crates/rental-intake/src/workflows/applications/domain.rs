use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::AuditTrail;
use super::payments::PaymentLedger;
use super::requirements::ConditionalRequirementsTracker;
use super::scoring::{ApplicationSnapshot, ScoreBreakdown};
use crate::workflows::lease::{LeaseSignatureStatus, LeaseSignatures};

/// Identifier wrapper for rental applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the listing an application targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

/// Identity issued by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roles supplied alongside every call by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Applicant,
    #[serde(alias = "reviewer")]
    Landlord,
    Agent,
    Admin,
    System,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Applicant => "applicant",
            Role::Landlord => "landlord",
            Role::Agent => "agent",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }

    /// Landlords, agents, and admins all act as reviewers of an application.
    pub const fn is_reviewer(self) -> bool {
        matches!(self, Role::Landlord | Role::Agent | Role::Admin)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "applicant" | "tenant" => Some(Role::Applicant),
            "landlord" | "reviewer" => Some(Role::Landlord),
            "agent" => Some(Role::Agent),
            "admin" => Some(Role::Admin),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// The identity plus role performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId(id.into()),
            role,
        }
    }

    pub fn applicant(id: impl Into<String>) -> Self {
        Self::new(id, Role::Applicant)
    }

    pub fn landlord(id: impl Into<String>) -> Self {
        Self::new(id, Role::Landlord)
    }

    pub fn system() -> Self {
        Self::new("system", Role::System)
    }
}

/// Lifecycle status of a rental application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    PendingPayment,
    PaymentVerified,
    Submitted,
    UnderReview,
    InfoRequested,
    ConditionalApproval,
    Approved,
    Rejected,
    Withdrawn,
    Expired,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 11] = [
        ApplicationStatus::Draft,
        ApplicationStatus::PendingPayment,
        ApplicationStatus::PaymentVerified,
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::InfoRequested,
        ApplicationStatus::ConditionalApproval,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
        ApplicationStatus::Expired,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::PendingPayment => "pending_payment",
            ApplicationStatus::PaymentVerified => "payment_verified",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::InfoRequested => "info_requested",
            ApplicationStatus::ConditionalApproval => "conditional_approval",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
            ApplicationStatus::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved
                | ApplicationStatus::Rejected
                | ApplicationStatus::Withdrawn
                | ApplicationStatus::Expired
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable record of a status change. Ordering by `changed_at` is the canonical history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: ApplicationStatus,
    pub changed_at: DateTime<Utc>,
    pub changed_by: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Self-reported credit standing; no bureau pull happens inside this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Unreported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    Retired,
    Student,
    Unemployed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmploymentRecord {
    pub status: EmploymentStatus,
    pub employer: Option<String>,
    pub months_employed: u16,
}

/// Prior tenancy reported by the applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalHistoryEntry {
    pub address: String,
    pub landlord_contact: Option<String>,
    pub monthly_rent: u32,
    pub months: u16,
    pub late_payments: u8,
    pub evicted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    GovernmentId,
    PayStub,
    BankStatement,
    EmploymentLetter,
    ReferenceLetter,
    Other,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::GovernmentId => "government_id",
            DocumentKind::PayStub => "pay_stub",
            DocumentKind::BankStatement => "bank_statement",
            DocumentKind::EmploymentLetter => "employment_letter",
            DocumentKind::ReferenceLetter => "reference_letter",
            DocumentKind::Other => "other",
        }
    }
}

/// Opaque pointer into document storage. Contents are never inspected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub kind: DocumentKind,
    pub storage_key: String,
}

/// Applicant supplied data that feeds scoring.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub monthly_income: u32,
    pub credit_tier: Option<CreditTier>,
    #[serde(default)]
    pub rental_history: Vec<RentalHistoryEntry>,
    pub employment: Option<EmploymentRecord>,
    #[serde(default)]
    pub documents: Vec<DocumentReference>,
}

/// Aggregate root. Every other lifecycle entity is owned by, and reachable only through, an
/// application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: ActorId,
    pub listing_id: ListingId,
    pub status: ApplicationStatus,
    pub previous_status: Option<ApplicationStatus>,
    pub details: ApplicantDetails,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub scored_at: Option<DateTime<Utc>>,
    #[serde(rename = "conditional_requirements")]
    pub requirements: ConditionalRequirementsTracker,
    #[serde(flatten)]
    pub payments: PaymentLedger,
    #[serde(flatten)]
    pub audit: AuditTrail,
    #[serde(flatten)]
    pub lease: LeaseSignatures,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the repository on every write.
    pub revision: u64,
}

impl Application {
    /// Build a fresh draft with its opening history entry.
    pub fn draft(
        id: ApplicationId,
        applicant_id: ActorId,
        listing_id: ListingId,
        details: ApplicantDetails,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut audit = AuditTrail::default();
        audit.append_status(StatusHistoryEntry {
            status: ApplicationStatus::Draft,
            changed_at: now,
            changed_by: applicant_id.clone(),
            reason: None,
        });

        Self {
            id,
            applicant_id,
            listing_id,
            status: ApplicationStatus::Draft,
            previous_status: None,
            details,
            score_breakdown: None,
            scored_at: None,
            requirements: ConditionalRequirementsTracker::default(),
            payments: PaymentLedger::default(),
            audit,
            lease: LeaseSignatures::default(),
            created_at: now,
            updated_at: now,
            expires_at,
            revision: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_owned_by(&self, actor: &Actor) -> bool {
        actor.id == self.applicant_id
    }

    pub fn snapshot(&self, monthly_rent: u32) -> ApplicationSnapshot<'_> {
        ApplicationSnapshot {
            monthly_rent,
            details: &self.details,
        }
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            applicant_id: self.applicant_id.clone(),
            revision: self.revision,
            status: self.status.label(),
            previous_status: self.previous_status.map(ApplicationStatus::label),
            paid: self.payments.is_paid(),
            outstanding_requirements: self.requirements.outstanding_required(),
            total_score: self.score_breakdown.as_ref().map(|score| score.total_score),
            max_score: self.score_breakdown.as_ref().map(|score| score.max_score),
            lease_signature_status: self.lease.status(),
            updated_at: self.updated_at,
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub applicant_id: ActorId,
    /// Repository revision the view was rendered from.
    pub revision: u64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<&'static str>,
    pub paid: bool,
    pub outstanding_requirements: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<u16>,
    pub lease_signature_status: LeaseSignatureStatus,
    pub updated_at: DateTime<Utc>,
}
