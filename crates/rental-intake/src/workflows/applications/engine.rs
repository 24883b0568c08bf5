use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::domain::{Actor, Application, ApplicationStatus, Role, StatusHistoryEntry};
use super::error::LifecycleError;
use super::requirements::RequirementDraft;
use super::transitions::{Precondition, TransitionRule, TransitionTable};

/// Status change requested by an actor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransitionRequest {
    pub target: ApplicationStatus,
    #[serde(default)]
    pub reason: Option<String>,
    /// Seeds the requirement tracker; only valid when entering conditional approval.
    #[serde(default)]
    pub requirements: Option<Vec<RequirementDraft>>,
    #[serde(default)]
    pub requirements_due: Option<NaiveDate>,
}

impl TransitionRequest {
    pub fn to(target: ApplicationStatus) -> Self {
        Self {
            target,
            reason: None,
            requirements: None,
            requirements_due: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_requirements(
        mut self,
        requirements: Vec<RequirementDraft>,
        due: Option<NaiveDate>,
    ) -> Self {
        self.requirements = Some(requirements);
        self.requirements_due = due;
        self
    }
}

/// Validates and applies status changes against the permission table.
#[derive(Debug, Clone, Default)]
pub struct StatusTransitionEngine {
    table: TransitionTable,
}

impl StatusTransitionEngine {
    pub fn new(table: TransitionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Targets the actor could request from the application's current status, ignoring
    /// preconditions.
    pub fn permitted_targets(
        &self,
        application: &Application,
        actor: &Actor,
    ) -> Vec<ApplicationStatus> {
        if actor.role == Role::Applicant && !application.is_owned_by(actor) {
            return Vec::new();
        }
        self.table
            .targets(application.status)
            .into_iter()
            .filter(|target| {
                self.table
                    .rule(application.status, *target)
                    .is_some_and(|rule| rule.permits(actor.role))
            })
            .collect()
    }

    /// Apply a transition in place. On error the application is left untouched.
    ///
    /// Checks run in a fixed order: edge lookup, role, payload, then preconditions. An edge
    /// missing from the table is always `InvalidTransition`, whatever the actor's role.
    pub fn apply(
        &self,
        application: &mut Application,
        actor: &Actor,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<StatusHistoryEntry, LifecycleError> {
        let from = application.status;
        let to = request.target;

        let rule = self
            .table
            .rule(from, to)
            .ok_or(LifecycleError::InvalidTransition { from, to })?;

        authorize(rule, application, actor)?;

        if request.requirements.is_some() && to != ApplicationStatus::ConditionalApproval {
            return Err(LifecycleError::validation(format!(
                "requirements can only accompany a transition to {}",
                ApplicationStatus::ConditionalApproval
            )));
        }

        for precondition in &rule.preconditions {
            check(*precondition, application, now)?;
        }

        if let Some(drafts) = request.requirements {
            application
                .requirements
                .seed(drafts, request.requirements_due)?;
        }

        let entry = StatusHistoryEntry {
            status: to,
            changed_at: now,
            changed_by: actor.id.clone(),
            reason: request
                .reason
                .map(|reason| reason.trim().to_string())
                .filter(|reason| !reason.is_empty()),
        };

        application.previous_status = Some(from);
        application.status = to;
        application.updated_at = now;
        application.audit.append_status(entry.clone());

        Ok(entry)
    }
}

fn authorize(
    rule: &TransitionRule,
    application: &Application,
    actor: &Actor,
) -> Result<(), LifecycleError> {
    let action = format!("move an application from {} to {}", rule.from, rule.to);
    if !rule.permits(actor.role) {
        return Err(LifecycleError::unauthorized(actor.role, action));
    }
    if actor.role == Role::Applicant && !application.is_owned_by(actor) {
        return Err(LifecycleError::unauthorized(
            actor.role,
            format!("{action} on behalf of another applicant"),
        ));
    }
    Ok(())
}

fn check(
    precondition: Precondition,
    application: &Application,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    match precondition {
        Precondition::PaymentVerified if !application.payments.is_paid() => Err(
            LifecycleError::precondition("application fee has not been paid or verified"),
        ),
        Precondition::RequiredRequirementsSatisfied
            if !application.requirements.all_required_satisfied() =>
        {
            Err(LifecycleError::precondition(format!(
                "{} required condition(s) still outstanding",
                application.requirements.outstanding_required()
            )))
        }
        Precondition::DeadlineElapsed => match application.expires_at {
            Some(deadline) if deadline <= now => Ok(()),
            Some(deadline) => Err(LifecycleError::precondition(format!(
                "application does not expire until {}",
                deadline.to_rfc3339()
            ))),
            None => Err(LifecycleError::precondition(
                "application has no expiry deadline",
            )),
        },
        _ => Ok(()),
    }
}
