//! Append-only audit trail for an application.
//!
//! Status changes and reviewer comments are stored here; payment attempts and verifications live
//! in the [`PaymentLedger`]. [`AuditTrail::history`] merges all four streams into one timeline,
//! newest first, and applies viewer visibility at read time.

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorId, Role, StatusHistoryEntry};
use super::payments::{PaymentAttempt, PaymentLedger, PaymentVerification};

/// Reviewer note. Never shown to applicant viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: ActorId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    #[serde(default)]
    status_history: Vec<StatusHistoryEntry>,
    #[serde(default)]
    comments: Vec<Comment>,
}

impl AuditTrail {
    pub fn append_status(&mut self, entry: StatusHistoryEntry) {
        self.status_history.push(entry);
    }

    pub fn append_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn latest_status(&self) -> Option<&StatusHistoryEntry> {
        self.status_history.last()
    }

    /// Merged timeline sorted by timestamp, newest first. Events sharing a timestamp keep their
    /// recording order reversed, so the latest write still leads.
    pub fn history(&self, ledger: &PaymentLedger, viewer: Role) -> Vec<AuditEvent> {
        let applicant_view = viewer == Role::Applicant;

        let mut events: Vec<AuditEvent> = self
            .status_history
            .iter()
            .cloned()
            .map(AuditEvent::StatusChange)
            .chain(ledger.attempts().iter().cloned().map(AuditEvent::PaymentAttempt))
            .chain(ledger.verifications().iter().cloned().map(|mut verification| {
                if applicant_view {
                    verification.internal_note = None;
                }
                AuditEvent::PaymentVerification(verification)
            }))
            .collect();

        if !applicant_view {
            events.extend(self.comments.iter().cloned().map(AuditEvent::Comment));
        }

        events.reverse();
        events.sort_by(|left, right| right.at().cmp(&left.at()));
        events
    }
}

/// One entry of the merged audit timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    StatusChange(StatusHistoryEntry),
    PaymentAttempt(PaymentAttempt),
    PaymentVerification(PaymentVerification),
    Comment(Comment),
}

impl AuditEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::StatusChange(entry) => entry.changed_at,
            AuditEvent::PaymentAttempt(attempt) => attempt.timestamp,
            AuditEvent::PaymentVerification(verification) => verification.verified_at,
            AuditEvent::Comment(comment) => comment.created_at,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            AuditEvent::StatusChange(_) => "status_change",
            AuditEvent::PaymentAttempt(_) => "payment_attempt",
            AuditEvent::PaymentVerification(_) => "payment_verification",
            AuditEvent::Comment(_) => "comment",
        }
    }

    fn to_row(&self) -> AuditCsvRow<'_> {
        match self {
            AuditEvent::StatusChange(entry) => AuditCsvRow {
                at: entry.changed_at.to_rfc3339(),
                event: self.label(),
                actor: Some(entry.changed_by.0.as_str()),
                summary: entry.status.label().to_string(),
                detail: entry.reason.as_deref().unwrap_or_default(),
            },
            AuditEvent::PaymentAttempt(attempt) => AuditCsvRow {
                at: attempt.timestamp.to_rfc3339(),
                event: self.label(),
                actor: None,
                summary: format!(
                    "{} {} ({})",
                    attempt.status.label(),
                    attempt.amount,
                    attempt.reference_id
                ),
                detail: attempt.error_message.as_deref().unwrap_or_default(),
            },
            AuditEvent::PaymentVerification(verification) => AuditCsvRow {
                at: verification.verified_at.to_rfc3339(),
                event: self.label(),
                actor: Some(verification.verified_by.0.as_str()),
                summary: format!(
                    "{} {} ({})",
                    verification.payment_method, verification.amount, verification.reference_id
                ),
                detail: verification.internal_note.as_deref().unwrap_or_default(),
            },
            AuditEvent::Comment(comment) => AuditCsvRow {
                at: comment.created_at.to_rfc3339(),
                event: self.label(),
                actor: Some(comment.author.0.as_str()),
                summary: String::new(),
                detail: &comment.body,
            },
        }
    }
}

#[derive(Serialize)]
struct AuditCsvRow<'a> {
    at: String,
    event: &'static str,
    actor: Option<&'a str>,
    summary: String,
    detail: &'a str,
}

/// Write a timeline as CSV with an `at,event,actor,summary,detail` header.
pub fn export_csv<W: io::Write>(events: &[AuditEvent], writer: W) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for event in events {
        csv_writer.serialize(event.to_row())?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::applications::domain::{ApplicationId, ApplicationStatus};
    use crate::workflows::applications::payments::{PaymentAttemptStatus, VerificationRequest};
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn trail_and_ledger() -> (AuditTrail, PaymentLedger) {
        let mut trail = AuditTrail::default();
        trail.append_status(StatusHistoryEntry {
            status: ApplicationStatus::Draft,
            changed_at: t(0),
            changed_by: ActorId("applicant-1".to_string()),
            reason: None,
        });
        trail.append_status(StatusHistoryEntry {
            status: ApplicationStatus::PendingPayment,
            changed_at: t(5),
            changed_by: ActorId("applicant-1".to_string()),
            reason: None,
        });
        trail.append_comment(Comment {
            author: ActorId("landlord-1".to_string()),
            body: "called previous landlord".to_string(),
            created_at: t(20),
        });

        let mut ledger = PaymentLedger::default();
        ledger
            .record_attempt(PaymentAttempt {
                reference_id: "PAY-1".to_string(),
                timestamp: t(10),
                status: PaymentAttemptStatus::Failed,
                amount: 45,
                error_message: Some("card declined".to_string()),
            })
            .expect("attempt");
        ledger
            .verify(
                &ApplicationId("app-1".to_string()),
                VerificationRequest {
                    reference_id: Some("CHK-1".to_string()),
                    amount: Some(45),
                    payment_method: Some("check".to_string()),
                    received_at: Some(t(14)),
                    internal_note: Some("left with front desk".to_string()),
                    confirmed: true,
                },
                &ActorId("landlord-1".to_string()),
                t(15),
            )
            .expect("verified");

        (trail, ledger)
    }

    #[test]
    fn history_is_newest_first_across_streams() {
        let (trail, ledger) = trail_and_ledger();
        let events = trail.history(&ledger, Role::Landlord);

        let labels: Vec<_> = events.iter().map(AuditEvent::label).collect();
        assert_eq!(
            labels,
            vec![
                "comment",
                "payment_verification",
                "payment_attempt",
                "status_change",
                "status_change"
            ]
        );
        assert!(events.windows(2).all(|pair| pair[0].at() >= pair[1].at()));
    }

    #[test]
    fn applicant_view_hides_comments_and_internal_notes() {
        let (trail, ledger) = trail_and_ledger();
        let events = trail.history(&ledger, Role::Applicant);

        assert!(events
            .iter()
            .all(|event| !matches!(event, AuditEvent::Comment(_))));
        let verification = events
            .iter()
            .find_map(|event| match event {
                AuditEvent::PaymentVerification(verification) => Some(verification),
                _ => None,
            })
            .expect("verification visible");
        assert!(verification.internal_note.is_none());

        // Storage is untouched by the filtered read.
        assert_eq!(trail.comments().len(), 1);
        assert!(ledger.verifications()[0].internal_note.is_some());
    }

    #[test]
    fn equal_timestamps_list_latest_write_first() {
        let mut trail = AuditTrail::default();
        for status in [ApplicationStatus::PaymentVerified, ApplicationStatus::Submitted] {
            trail.append_status(StatusHistoryEntry {
                status,
                changed_at: t(30),
                changed_by: ActorId("system".to_string()),
                reason: None,
            });
        }

        let events = trail.history(&PaymentLedger::default(), Role::Admin);
        match &events[0] {
            AuditEvent::StatusChange(entry) => {
                assert_eq!(entry.status, ApplicationStatus::Submitted)
            }
            other => panic!("expected status change, got {other:?}"),
        }
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let (trail, ledger) = trail_and_ledger();
        let events = trail.history(&ledger, Role::Landlord);

        let mut buffer = Vec::new();
        export_csv(&events, &mut buffer).expect("csv export");
        let text = String::from_utf8(buffer).expect("utf8");
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some("at,event,actor,summary,detail"));
        assert_eq!(lines.count(), events.len());
        assert!(text.contains("card declined"));
        assert!(text.contains("pending_payment"));
    }
}
