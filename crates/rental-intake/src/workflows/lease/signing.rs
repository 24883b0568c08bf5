use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::disclosures::DisclosureRegistry;
use crate::workflows::applications::domain::{Actor, ActorId, ApplicationStatus, Role};
use crate::workflows::applications::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningParty {
    Tenant,
    Landlord,
}

impl SigningParty {
    pub const fn label(self) -> &'static str {
        match self {
            SigningParty::Tenant => "tenant",
            SigningParty::Landlord => "landlord",
        }
    }

    /// The side of the lease an actor signs for. Reviewer roles sign for the landlord.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Applicant => Some(SigningParty::Tenant),
            Role::Landlord | Role::Agent | Role::Admin => Some(SigningParty::Landlord),
            Role::System => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseSignatureStatus {
    #[default]
    Unsigned,
    PartiallySigned,
    Signed,
}

impl LeaseSignatureStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeaseSignatureStatus::Unsigned => "unsigned",
            LeaseSignatureStatus::PartiallySigned => "partially_signed",
            LeaseSignatureStatus::Signed => "signed",
        }
    }
}

/// One party's signature. Never overwritten once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSignature {
    pub party: SigningParty,
    pub signer_id: ActorId,
    pub signer_name: String,
    pub signature_image_data: String,
    pub disclosure_acknowledgments: BTreeMap<String, bool>,
    pub jurisdiction: String,
    pub signed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Signature state persisted on the application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeaseSignatures {
    #[serde(default)]
    lease_signature_status: LeaseSignatureStatus,
    #[serde(default)]
    lease_signatures: Vec<LeaseSignature>,
}

impl LeaseSignatures {
    pub fn status(&self) -> LeaseSignatureStatus {
        self.lease_signature_status
    }

    pub fn signatures(&self) -> &[LeaseSignature] {
        &self.lease_signatures
    }

    pub fn signature_for(&self, party: SigningParty) -> Option<&LeaseSignature> {
        self.lease_signatures
            .iter()
            .find(|signature| signature.party == party)
    }

    fn has_signed(&self, party: SigningParty) -> bool {
        self.signature_for(party).is_some()
    }
}

/// Order in which the parties must sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningOrder(Vec<SigningParty>);

impl SigningOrder {
    /// Returns `None` when the sequence is empty or names a party twice.
    pub fn new(parties: Vec<SigningParty>) -> Option<Self> {
        let mut seen = parties.clone();
        seen.sort();
        seen.dedup();
        if parties.is_empty() || seen.len() != parties.len() {
            return None;
        }
        Some(Self(parties))
    }

    pub fn parties(&self) -> &[SigningParty] {
        &self.0
    }

    fn next_unsigned(&self, lease: &LeaseSignatures) -> Option<SigningParty> {
        self.0
            .iter()
            .copied()
            .find(|party| !lease.has_signed(*party))
    }

    fn status_of(&self, lease: &LeaseSignatures) -> LeaseSignatureStatus {
        match self.next_unsigned(lease) {
            None => LeaseSignatureStatus::Signed,
            Some(_) if lease.lease_signatures.is_empty() => LeaseSignatureStatus::Unsigned,
            Some(_) => LeaseSignatureStatus::PartiallySigned,
        }
    }
}

impl Default for SigningOrder {
    fn default() -> Self {
        Self(vec![SigningParty::Tenant, SigningParty::Landlord])
    }
}

/// Signing form as submitted by one party.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignatureSubmission {
    pub signer_name: String,
    pub signature_image_data: String,
    #[serde(default)]
    pub disclosure_acknowledgments: BTreeMap<String, bool>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Application facts the signing workflow depends on.
#[derive(Debug, Clone, Copy)]
pub struct SigningContext<'a> {
    pub application_status: ApplicationStatus,
    pub applicant_id: &'a ActorId,
    pub state_code: &'a str,
}

/// Two-party lease signature workflow, unlocked once an application is approved.
#[derive(Debug, Clone)]
pub struct LeaseSigningStateMachine {
    order: SigningOrder,
    registry: DisclosureRegistry,
    min_signature_bytes: usize,
}

impl LeaseSigningStateMachine {
    pub fn new(
        order: SigningOrder,
        registry: DisclosureRegistry,
        min_signature_bytes: usize,
    ) -> Self {
        Self {
            order,
            registry,
            min_signature_bytes,
        }
    }

    pub fn registry(&self) -> &DisclosureRegistry {
        &self.registry
    }

    pub fn order(&self) -> &SigningOrder {
        &self.order
    }

    /// The party expected to sign next, if the lease is not complete.
    pub fn next_party(&self, lease: &LeaseSignatures) -> Option<SigningParty> {
        self.order.next_unsigned(lease)
    }

    /// Record a signature and return the resulting aggregate status. Nothing is written unless
    /// every check passes.
    pub fn sign(
        &self,
        lease: &mut LeaseSignatures,
        context: &SigningContext<'_>,
        actor: &Actor,
        submission: SignatureSubmission,
        now: DateTime<Utc>,
    ) -> Result<LeaseSignatureStatus, LifecycleError> {
        if context.application_status != ApplicationStatus::Approved {
            return Err(LifecycleError::precondition(format!(
                "lease signing unlocks once the application is approved (currently {})",
                context.application_status
            )));
        }

        if self.order.status_of(lease) == LeaseSignatureStatus::Signed {
            return Err(LifecycleError::AlreadySigned(
                "lease is already fully signed".to_string(),
            ));
        }

        let party = SigningParty::for_role(actor.role)
            .ok_or_else(|| LifecycleError::unauthorized(actor.role, "sign the lease"))?;

        if party == SigningParty::Tenant && actor.id != *context.applicant_id {
            return Err(LifecycleError::unauthorized(
                actor.role,
                "sign on behalf of another applicant",
            ));
        }

        if !self.order.parties().contains(&party) {
            return Err(LifecycleError::unauthorized(
                actor.role,
                format!("sign as {}", party.label()),
            ));
        }

        if lease.has_signed(party) {
            return Err(LifecycleError::AlreadySigned(format!(
                "{} has already signed",
                party.label()
            )));
        }

        if let Some(expected) = self.order.next_unsigned(lease) {
            if expected != party {
                return Err(LifecycleError::InvalidSigningStep(format!(
                    "{} must sign before {}",
                    expected.label(),
                    party.label()
                )));
            }
        }

        let signer_name = submission.signer_name.trim().to_string();
        if signer_name.is_empty() {
            return Err(LifecycleError::validation("signer name is required"));
        }

        if submission.signature_image_data.trim().len() < self.min_signature_bytes {
            return Err(LifecycleError::validation(format!(
                "signature image must be at least {} bytes",
                self.min_signature_bytes
            )));
        }

        let missing = self
            .registry
            .missing_acknowledgments(context.state_code, &submission.disclosure_acknowledgments);
        if !missing.is_empty() {
            return Err(LifecycleError::validation(format!(
                "disclosures not acknowledged: {}",
                missing.join(", ")
            )));
        }

        lease.lease_signatures.push(LeaseSignature {
            party,
            signer_id: actor.id.clone(),
            signer_name,
            signature_image_data: submission.signature_image_data,
            disclosure_acknowledgments: submission.disclosure_acknowledgments,
            jurisdiction: context.state_code.trim().to_ascii_uppercase(),
            signed_at: now,
            ip_address: submission.ip_address,
        });
        lease.lease_signature_status = self.order.status_of(lease);

        Ok(lease.lease_signature_status)
    }
}

impl Default for LeaseSigningStateMachine {
    fn default() -> Self {
        Self::new(SigningOrder::default(), DisclosureRegistry::standard(), 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 18, 45, 0).unwrap()
    }

    fn applicant_id() -> ActorId {
        ActorId("applicant-1".to_string())
    }

    fn context(applicant: &ActorId, status: ApplicationStatus) -> SigningContext<'_> {
        SigningContext {
            application_status: status,
            applicant_id: applicant,
            state_code: "CA",
        }
    }

    fn submission(machine: &LeaseSigningStateMachine, name: &str) -> SignatureSubmission {
        SignatureSubmission {
            signer_name: name.to_string(),
            signature_image_data: format!("data:image/png;base64,{}", "A".repeat(96)),
            disclosure_acknowledgments: machine
                .registry()
                .required_for("CA")
                .into_iter()
                .map(|disclosure| (disclosure.key.clone(), true))
                .collect(),
            ip_address: Some("203.0.113.7".to_string()),
        }
    }

    #[test]
    fn tenant_then_landlord_completes_the_lease() {
        let machine = LeaseSigningStateMachine::default();
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::Approved);
        let mut lease = LeaseSignatures::default();

        let status = machine
            .sign(
                &mut lease,
                &ctx,
                &Actor::applicant("applicant-1"),
                submission(&machine, "Jordan Tenant"),
                now(),
            )
            .expect("tenant signs");
        assert_eq!(status, LeaseSignatureStatus::PartiallySigned);
        assert_eq!(machine.next_party(&lease), Some(SigningParty::Landlord));

        let status = machine
            .sign(
                &mut lease,
                &ctx,
                &Actor::landlord("landlord-1"),
                submission(&machine, "Casey Landlord"),
                now(),
            )
            .expect("landlord signs");
        assert_eq!(status, LeaseSignatureStatus::Signed);
        assert_eq!(lease.signatures().len(), 2);
        assert_eq!(lease.signatures()[0].jurisdiction, "CA");
    }

    #[test]
    fn landlord_cannot_sign_first() {
        let machine = LeaseSigningStateMachine::default();
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::Approved);
        let mut lease = LeaseSignatures::default();

        let err = machine
            .sign(
                &mut lease,
                &ctx,
                &Actor::landlord("landlord-1"),
                submission(&machine, "Casey Landlord"),
                now(),
            )
            .expect_err("out of order");
        assert!(matches!(err, LifecycleError::InvalidSigningStep(_)));
        assert_eq!(lease.status(), LeaseSignatureStatus::Unsigned);
    }

    #[test]
    fn signing_is_locked_until_approval() {
        let machine = LeaseSigningStateMachine::default();
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::ConditionalApproval);
        let mut lease = LeaseSignatures::default();

        let err = machine
            .sign(
                &mut lease,
                &ctx,
                &Actor::applicant("applicant-1"),
                submission(&machine, "Jordan Tenant"),
                now(),
            )
            .expect_err("locked");
        assert!(matches!(err, LifecycleError::PreconditionNotMet(_)));
    }

    #[test]
    fn other_applicants_and_system_are_unauthorized() {
        let machine = LeaseSigningStateMachine::default();
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::Approved);
        let mut lease = LeaseSignatures::default();

        for actor in [Actor::applicant("applicant-2"), Actor::system()] {
            let err = machine
                .sign(&mut lease, &ctx, &actor, submission(&machine, "Someone"), now())
                .expect_err("unauthorized");
            assert!(matches!(err, LifecycleError::Unauthorized { .. }), "{err}");
        }
        assert!(lease.signatures().is_empty());
    }

    #[test]
    fn signatures_are_never_overwritten() {
        let machine = LeaseSigningStateMachine::default();
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::Approved);
        let mut lease = LeaseSignatures::default();
        let tenant = Actor::applicant("applicant-1");

        machine
            .sign(&mut lease, &ctx, &tenant, submission(&machine, "Jordan Tenant"), now())
            .expect("tenant signs");
        let err = machine
            .sign(&mut lease, &ctx, &tenant, submission(&machine, "J. Tenant"), now())
            .expect_err("resubmission");
        assert!(matches!(err, LifecycleError::AlreadySigned(_)));
        assert_eq!(lease.signatures()[0].signer_name, "Jordan Tenant");

        machine
            .sign(
                &mut lease,
                &ctx,
                &Actor::landlord("landlord-1"),
                submission(&machine, "Casey Landlord"),
                now(),
            )
            .expect("landlord signs");
        for actor in [tenant, Actor::landlord("landlord-1")] {
            let err = machine
                .sign(&mut lease, &ctx, &actor, submission(&machine, "Again"), now())
                .expect_err("complete");
            assert!(matches!(err, LifecycleError::AlreadySigned(_)));
        }
    }

    #[test]
    fn missing_state_disclosure_is_a_validation_error() {
        let machine = LeaseSigningStateMachine::default();
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::Approved);
        let mut lease = LeaseSignatures::default();
        let mut form = submission(&machine, "Jordan Tenant");
        form.disclosure_acknowledgments
            .insert("ca_megans_law".to_string(), false);

        let err = machine
            .sign(&mut lease, &ctx, &Actor::applicant("applicant-1"), form, now())
            .expect_err("unacknowledged");
        match err {
            LifecycleError::Validation(message) => assert!(message.contains("ca_megans_law")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(lease.status(), LeaseSignatureStatus::Unsigned);
    }

    #[test]
    fn blank_name_and_tiny_signature_are_rejected() {
        let machine = LeaseSigningStateMachine::default();
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::Approved);
        let mut lease = LeaseSignatures::default();
        let tenant = Actor::applicant("applicant-1");

        let mut blank_name = submission(&machine, "   ");
        blank_name.signer_name = "  ".to_string();
        let mut tiny = submission(&machine, "Jordan Tenant");
        tiny.signature_image_data = "data:,".to_string();

        for form in [blank_name, tiny] {
            let err = machine
                .sign(&mut lease, &ctx, &tenant, form, now())
                .expect_err("invalid");
            assert!(matches!(err, LifecycleError::Validation(_)));
        }
    }

    #[test]
    fn signing_order_is_configurable() {
        let order = SigningOrder::new(vec![SigningParty::Landlord, SigningParty::Tenant])
            .expect("valid order");
        let machine = LeaseSigningStateMachine::new(order, DisclosureRegistry::standard(), 8);
        let applicant = applicant_id();
        let ctx = context(&applicant, ApplicationStatus::Approved);
        let mut lease = LeaseSignatures::default();

        let err = machine
            .sign(
                &mut lease,
                &ctx,
                &Actor::applicant("applicant-1"),
                submission(&machine, "Jordan Tenant"),
                now(),
            )
            .expect_err("landlord first");
        assert!(matches!(err, LifecycleError::InvalidSigningStep(_)));

        let status = machine
            .sign(
                &mut lease,
                &ctx,
                &Actor::landlord("landlord-1"),
                submission(&machine, "Casey Landlord"),
                now(),
            )
            .expect("landlord signs first");
        assert_eq!(status, LeaseSignatureStatus::PartiallySigned);
    }

    #[test]
    fn signing_order_rejects_duplicates() {
        assert!(SigningOrder::new(vec![SigningParty::Tenant, SigningParty::Tenant]).is_none());
        assert!(SigningOrder::new(Vec::new()).is_none());
    }
}
