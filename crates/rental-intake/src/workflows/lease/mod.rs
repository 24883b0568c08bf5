//! Lease signing once an application is approved.

pub mod disclosures;
pub mod drafts;
pub mod signing;

pub use disclosures::{Disclosure, DisclosureRegistry};
pub use drafts::{LeaseDraft, LeaseDraftStore};
pub use signing::{
    LeaseSignature, LeaseSignatureStatus, LeaseSignatures, LeaseSigningStateMachine,
    SignatureSubmission, SigningContext, SigningOrder, SigningParty,
};
