use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::{ActorId, ApplicationId};
use super::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAttemptStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentAttemptStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentAttemptStatus::Pending => "pending",
            PaymentAttemptStatus::Success => "success",
            PaymentAttemptStatus::Failed => "failed",
        }
    }
}

/// Automated capture attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub reference_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: PaymentAttemptStatus,
    pub amount: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Reviewer recorded proof of an out-of-band payment. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub reference_id: String,
    pub amount: u32,
    pub payment_method: String,
    pub received_at: DateTime<Utc>,
    pub verified_by: ActorId,
    pub verified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_note: Option<String>,
}

/// Manual verification form as submitted by a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationRequest {
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub amount: Option<u32>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub internal_note: Option<String>,
    /// The reviewer must explicitly confirm the funds were received.
    #[serde(default)]
    pub confirmed: bool,
}

/// Both payment collections for one application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentLedger {
    #[serde(rename = "payment_attempts", default)]
    attempts: Vec<PaymentAttempt>,
    #[serde(rename = "payment_verifications", default)]
    verifications: Vec<PaymentVerification>,
}

impl PaymentLedger {
    /// Paid once any automated attempt succeeded or any manual verification exists.
    pub fn is_paid(&self) -> bool {
        !self.verifications.is_empty()
            || self
                .attempts
                .iter()
                .any(|attempt| attempt.status == PaymentAttemptStatus::Success)
    }

    pub fn has_reference(&self, reference_id: &str) -> bool {
        self.attempts
            .iter()
            .any(|attempt| attempt.reference_id == reference_id)
            || self
                .verifications
                .iter()
                .any(|verification| verification.reference_id == reference_id)
    }

    pub fn record_attempt(&mut self, attempt: PaymentAttempt) -> Result<(), LifecycleError> {
        if self.has_reference(&attempt.reference_id) {
            return Err(LifecycleError::DuplicateReference(attempt.reference_id));
        }
        self.attempts.push(attempt);
        Ok(())
    }

    /// Record a manual verification. Validation runs before the idempotency guard so a malformed
    /// form is reported as such even on a paid application; nothing is written on failure.
    pub fn verify(
        &mut self,
        application_id: &ApplicationId,
        request: VerificationRequest,
        verified_by: &ActorId,
        now: DateTime<Utc>,
    ) -> Result<&PaymentVerification, LifecycleError> {
        if !request.confirmed {
            return Err(LifecycleError::validation(
                "payment receipt must be explicitly confirmed",
            ));
        }

        let amount = match request.amount {
            Some(amount) if amount > 0 => amount,
            _ => {
                return Err(LifecycleError::validation(
                    "amount must be greater than zero",
                ))
            }
        };

        let payment_method = request
            .payment_method
            .map(|method| method.trim().to_string())
            .filter(|method| !method.is_empty())
            .ok_or_else(|| LifecycleError::validation("payment method is required"))?;

        let received_at = request
            .received_at
            .ok_or_else(|| LifecycleError::validation("received date is required"))?;

        if self.is_paid() {
            return Err(LifecycleError::AlreadyVerified(application_id.clone()));
        }

        let reference_id = match request.reference_id {
            Some(reference) if !reference.trim().is_empty() => reference.trim().to_string(),
            Some(_) => {
                return Err(LifecycleError::validation(
                    "reference id may not be blank",
                ))
            }
            None => new_reference("VER"),
        };

        if self.has_reference(&reference_id) {
            return Err(LifecycleError::DuplicateReference(reference_id));
        }

        self.verifications.push(PaymentVerification {
            reference_id,
            amount,
            payment_method,
            received_at,
            verified_by: verified_by.clone(),
            verified_at: now,
            internal_note: request
                .internal_note
                .filter(|note| !note.trim().is_empty()),
        });

        Ok(&self.verifications[self.verifications.len() - 1])
    }

    pub fn attempts(&self) -> &[PaymentAttempt] {
        &self.attempts
    }

    pub fn verifications(&self) -> &[PaymentVerification] {
        &self.verifications
    }

    /// The latest verification; earlier ones stay in the history.
    pub fn current_verification(&self) -> Option<&PaymentVerification> {
        self.verifications.last()
    }
}

pub(crate) fn new_reference(prefix: &str) -> String {
    let token = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("{prefix}-{}", &token[..12])
}

/// Request handed to the capture gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub application_id: ApplicationId,
    pub reference_id: String,
    pub amount: u32,
}

/// Terminal result of a capture. A decline is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured,
    Pending,
    Declined { message: String },
}

/// Seam for automated payment capture.
///
/// Capture runs before the application write is committed, so a conflicting writer can discard
/// the recorded attempt after the processor has already charged. Implementations must treat
/// `reference_id` as an idempotency key: a repeated capture for the same reference never charges
/// twice.
pub trait PaymentGateway: Send + Sync {
    fn capture(&self, request: &CaptureRequest) -> CaptureOutcome;
}

impl PaymentAttempt {
    pub fn from_outcome(
        request: &CaptureRequest,
        outcome: CaptureOutcome,
        now: DateTime<Utc>,
    ) -> Self {
        let (status, error_message) = match outcome {
            CaptureOutcome::Captured => (PaymentAttemptStatus::Success, None),
            CaptureOutcome::Pending => (PaymentAttemptStatus::Pending, None),
            CaptureOutcome::Declined { message } => (PaymentAttemptStatus::Failed, Some(message)),
        };

        Self {
            reference_id: request.reference_id.clone(),
            timestamp: now,
            status,
            amount: request.amount,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 9, 30, 0).unwrap()
    }

    fn app_id() -> ApplicationId {
        ApplicationId("app-000001".to_string())
    }

    fn reviewer() -> ActorId {
        ActorId("landlord-1".to_string())
    }

    fn check_request() -> VerificationRequest {
        VerificationRequest {
            reference_id: Some("CHK-1042".to_string()),
            amount: Some(45),
            payment_method: Some("check".to_string()),
            received_at: Some(now()),
            internal_note: Some("dropped off at the office".to_string()),
            confirmed: true,
        }
    }

    fn attempt(reference: &str, status: PaymentAttemptStatus) -> PaymentAttempt {
        PaymentAttempt {
            reference_id: reference.to_string(),
            timestamp: now(),
            status,
            amount: 45,
            error_message: None,
        }
    }

    #[test]
    fn failed_attempts_leave_the_ledger_unpaid() {
        let mut ledger = PaymentLedger::default();
        ledger
            .record_attempt(attempt("PAY-1", PaymentAttemptStatus::Failed))
            .expect("recorded");
        ledger
            .record_attempt(attempt("PAY-2", PaymentAttemptStatus::Pending))
            .expect("recorded");
        assert!(!ledger.is_paid());

        ledger
            .record_attempt(attempt("PAY-3", PaymentAttemptStatus::Success))
            .expect("recorded");
        assert!(ledger.is_paid());
    }

    #[test]
    fn manual_verification_marks_paid() {
        let mut ledger = PaymentLedger::default();
        let verification = ledger
            .verify(&app_id(), check_request(), &reviewer(), now())
            .expect("verified");
        assert_eq!(verification.reference_id, "CHK-1042");
        assert_eq!(verification.verified_by, reviewer());
        assert!(ledger.is_paid());
        assert_eq!(
            ledger.current_verification().map(|v| v.amount),
            Some(45)
        );
    }

    #[test]
    fn unconfirmed_verification_is_rejected() {
        let mut ledger = PaymentLedger::default();
        let mut request = check_request();
        request.confirmed = false;

        let err = ledger
            .verify(&app_id(), request, &reviewer(), now())
            .expect_err("must confirm");
        assert!(matches!(err, LifecycleError::Validation(_)));
        assert!(ledger.verifications().is_empty());
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        let mut ledger = PaymentLedger::default();
        for request in [
            VerificationRequest {
                amount: None,
                ..check_request()
            },
            VerificationRequest {
                amount: Some(0),
                ..check_request()
            },
            VerificationRequest {
                payment_method: Some("  ".to_string()),
                ..check_request()
            },
            VerificationRequest {
                received_at: None,
                ..check_request()
            },
        ] {
            let err = ledger
                .verify(&app_id(), request, &reviewer(), now())
                .expect_err("invalid form");
            assert!(matches!(err, LifecycleError::Validation(_)), "{err}");
        }
        assert!(!ledger.is_paid());
    }

    #[test]
    fn second_verification_is_already_verified() {
        let mut ledger = PaymentLedger::default();
        ledger
            .verify(&app_id(), check_request(), &reviewer(), now())
            .expect("first");

        let second = VerificationRequest {
            reference_id: Some("CHK-2000".to_string()),
            ..check_request()
        };
        let err = ledger
            .verify(&app_id(), second, &reviewer(), now())
            .expect_err("double count");
        assert!(matches!(err, LifecycleError::AlreadyVerified(_)));
        assert_eq!(ledger.verifications().len(), 1);
    }

    #[test]
    fn successful_attempt_blocks_manual_verification() {
        let mut ledger = PaymentLedger::default();
        ledger
            .record_attempt(attempt("PAY-1", PaymentAttemptStatus::Success))
            .expect("recorded");
        let err = ledger
            .verify(&app_id(), check_request(), &reviewer(), now())
            .expect_err("already paid");
        assert!(matches!(err, LifecycleError::AlreadyVerified(_)));
    }

    #[test]
    fn references_are_unique_across_both_collections() {
        let mut ledger = PaymentLedger::default();
        ledger
            .record_attempt(attempt("CHK-1042", PaymentAttemptStatus::Failed))
            .expect("recorded");

        let err = ledger
            .verify(&app_id(), check_request(), &reviewer(), now())
            .expect_err("collision");
        assert!(matches!(err, LifecycleError::DuplicateReference(ref id) if id == "CHK-1042"));

        let err = ledger
            .record_attempt(attempt("CHK-1042", PaymentAttemptStatus::Success))
            .expect_err("collision");
        assert!(matches!(err, LifecycleError::DuplicateReference(_)));
        assert!(!ledger.is_paid());
    }

    #[test]
    fn generated_references_are_prefixed() {
        let mut ledger = PaymentLedger::default();
        let request = VerificationRequest {
            reference_id: None,
            ..check_request()
        };
        let verification = ledger
            .verify(&app_id(), request, &reviewer(), now())
            .expect("verified");
        assert!(verification.reference_id.starts_with("VER-"));
        assert_eq!(verification.reference_id.len(), 16);
    }

    #[test]
    fn declined_capture_becomes_failed_attempt() {
        let request = CaptureRequest {
            application_id: app_id(),
            reference_id: "PAY-77".to_string(),
            amount: 45,
        };
        let attempt = PaymentAttempt::from_outcome(
            &request,
            CaptureOutcome::Declined {
                message: "card declined".to_string(),
            },
            now(),
        );
        assert_eq!(attempt.status, PaymentAttemptStatus::Failed);
        assert_eq!(attempt.error_message.as_deref(), Some("card declined"));
    }
}
