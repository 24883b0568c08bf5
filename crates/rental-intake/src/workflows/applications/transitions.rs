//! Declarative permission table for application status changes.
//!
//! Each allowed `(source, target)` edge carries the roles that may request it and the
//! precondition predicates consulted before it is applied. The engine checks the table once per
//! request instead of branching on role names at call sites.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::domain::{ApplicationStatus, Role};

/// Predicates consulted before an edge is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// The payment ledger reports the application as paid.
    PaymentVerified,
    /// Every `required` conditional requirement is satisfied.
    RequiredRequirementsSatisfied,
    /// A stored expiry deadline exists and has passed.
    DeadlineElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub roles: BTreeSet<Role>,
    pub preconditions: Vec<Precondition>,
}

impl TransitionRule {
    pub fn permits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    fn requires(&mut self, precondition: Precondition) -> &mut Self {
        if !self.preconditions.contains(&precondition) {
            self.preconditions.push(precondition);
        }
        self
    }
}

const APPLICANT: &[Role] = &[Role::Applicant];
const REVIEWERS: &[Role] = &[Role::Landlord, Role::Agent, Role::Admin];
const SYSTEM: &[Role] = &[Role::System];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    rules: BTreeMap<(ApplicationStatus, ApplicationStatus), TransitionRule>,
}

impl TransitionTable {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// The rental application lifecycle.
    pub fn standard() -> Self {
        use ApplicationStatus::*;

        let mut table = Self::empty();

        table.allow(Draft, PendingPayment, APPLICANT);
        table.allow(Draft, Withdrawn, APPLICANT);

        table
            .allow(
                PendingPayment,
                PaymentVerified,
                &[
                    Role::Applicant,
                    Role::System,
                    Role::Landlord,
                    Role::Agent,
                    Role::Admin,
                ],
            )
            .requires(Precondition::PaymentVerified);
        table.allow(PendingPayment, Withdrawn, APPLICANT);

        table.allow(PaymentVerified, Submitted, &[Role::Applicant, Role::System]);

        table.allow(Submitted, UnderReview, REVIEWERS);
        table.allow(Submitted, Withdrawn, APPLICANT);

        // Reviewers may decide from any review-active state.
        for source in [Submitted, UnderReview, InfoRequested] {
            for decision in [InfoRequested, ConditionalApproval, Approved, Rejected] {
                if source != decision {
                    table.allow(source, decision, REVIEWERS);
                }
            }
        }

        table.allow(InfoRequested, UnderReview, &[Role::Applicant]);
        table.extend_roles(InfoRequested, UnderReview, REVIEWERS);
        table.allow(InfoRequested, Withdrawn, APPLICANT);

        table
            .allow(ConditionalApproval, Approved, REVIEWERS)
            .requires(Precondition::RequiredRequirementsSatisfied);
        table.allow(ConditionalApproval, Rejected, REVIEWERS);
        table.allow(ConditionalApproval, Withdrawn, APPLICANT);

        for source in ApplicationStatus::ALL {
            if !source.is_terminal() {
                table
                    .allow(source, Expired, SYSTEM)
                    .requires(Precondition::DeadlineElapsed);
            }
        }

        table
    }

    /// Register an edge, replacing the roles of an existing one.
    pub fn allow(
        &mut self,
        from: ApplicationStatus,
        to: ApplicationStatus,
        roles: &[Role],
    ) -> &mut TransitionRule {
        let rule = self.rules.entry((from, to)).or_insert_with(|| TransitionRule {
            from,
            to,
            roles: BTreeSet::new(),
            preconditions: Vec::new(),
        });
        rule.roles = roles.iter().copied().collect();
        rule
    }

    fn extend_roles(&mut self, from: ApplicationStatus, to: ApplicationStatus, roles: &[Role]) {
        if let Some(rule) = self.rules.get_mut(&(from, to)) {
            rule.roles.extend(roles.iter().copied());
        }
    }

    pub fn rule(&self, from: ApplicationStatus, to: ApplicationStatus) -> Option<&TransitionRule> {
        self.rules.get(&(from, to))
    }

    pub fn targets(&self, from: ApplicationStatus) -> Vec<ApplicationStatus> {
        self.rules
            .keys()
            .filter(|(source, _)| *source == from)
            .map(|(_, target)| *target)
            .collect()
    }

    pub fn rules(&self) -> impl Iterator<Item = &TransitionRule> {
        self.rules.values()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationStatus::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let table = TransitionTable::standard();
        for status in ApplicationStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(
                table.targets(status).is_empty(),
                "{status} should be terminal"
            );
        }
    }

    #[test]
    fn no_edge_loops_back_to_its_source() {
        let table = TransitionTable::standard();
        assert!(table.rules().all(|rule| rule.from != rule.to));
    }

    #[test]
    fn every_active_state_can_expire_through_the_system_actor() {
        let table = TransitionTable::standard();
        for status in ApplicationStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let rule = table.rule(status, Expired).expect("expiry edge");
            assert!(rule.permits(Role::System));
            assert!(!rule.permits(Role::Landlord));
            assert_eq!(rule.preconditions, vec![Precondition::DeadlineElapsed]);
        }
    }

    #[test]
    fn payment_and_requirement_gates_are_attached() {
        let table = TransitionTable::standard();
        assert_eq!(
            table
                .rule(PendingPayment, PaymentVerified)
                .expect("payment edge")
                .preconditions,
            vec![Precondition::PaymentVerified]
        );
        assert_eq!(
            table
                .rule(ConditionalApproval, Approved)
                .expect("approval edge")
                .preconditions,
            vec![Precondition::RequiredRequirementsSatisfied]
        );
        assert!(table
            .rule(PendingPayment, Withdrawn)
            .expect("withdraw edge")
            .preconditions
            .is_empty());
    }

    #[test]
    fn info_requested_returns_to_review_for_either_side() {
        let table = TransitionTable::standard();
        let rule = table.rule(InfoRequested, UnderReview).expect("edge");
        assert!(rule.permits(Role::Applicant));
        assert!(rule.permits(Role::Landlord));
        assert!(!rule.permits(Role::System));
    }

    #[test]
    fn decisions_are_reviewer_only() {
        let table = TransitionTable::standard();
        for source in [Submitted, UnderReview, InfoRequested] {
            let rule = table.rule(source, Approved).expect("approval edge");
            assert!(!rule.permits(Role::Applicant));
            assert!(rule.permits(Role::Agent));
        }
        assert!(table.rule(Draft, Approved).is_none());
        assert!(table.rule(PaymentVerified, UnderReview).is_none());
    }
}
