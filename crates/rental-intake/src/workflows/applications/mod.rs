//! Rental application lifecycle: status transitions, scoring, conditional requirements,
//! payment verification, and the merged audit trail.

pub mod audit;
pub mod cache;
pub mod domain;
pub mod engine;
pub mod error;
pub mod payments;
pub mod repository;
pub mod requirements;
pub mod router;
pub mod scoring;
pub mod service;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use audit::{AuditEvent, AuditTrail, Comment};
pub use domain::{
    Actor, ActorId, ApplicantDetails, Application, ApplicationId, ApplicationStatus,
    ApplicationStatusView, CreditTier, DocumentKind, DocumentReference, EmploymentRecord,
    EmploymentStatus, ListingId, RentalHistoryEntry, Role, StatusHistoryEntry,
};
pub use engine::{StatusTransitionEngine, TransitionRequest};
pub use error::{ErrorBody, ErrorKind, LifecycleError};
pub use payments::{
    CaptureOutcome, CaptureRequest, PaymentAttempt, PaymentAttemptStatus, PaymentGateway,
    PaymentLedger, PaymentVerification, VerificationRequest,
};
pub use repository::{
    ApplicationRepository, Clock, ListingDirectory, ListingSnapshot, Notification,
    NotificationError, NotificationPublisher, RepositoryError, SystemClock,
};
pub use requirements::{ConditionalRequirement, RequirementDraft, RequirementKind};
pub use router::application_router;
pub use scoring::{ApplicationSnapshot, ScoreBreakdown, ScoringConfig, ScoringEngine};
pub use service::ApplicationLifecycleService;
pub use transitions::{Precondition, TransitionRule, TransitionTable};
