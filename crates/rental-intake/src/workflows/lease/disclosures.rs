//! Jurisdiction disclosure registry.
//!
//! Keyed by a free-text two-letter state code. Unmapped codes fall back to a generic state-law
//! disclosure, so adding a jurisdiction is a registration rather than a code change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclosure {
    pub key: String,
    pub title: String,
    pub text: String,
}

impl Disclosure {
    pub fn new(key: &str, title: &str, text: &str) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosureRegistry {
    generic: Vec<Disclosure>,
    jurisdictions: BTreeMap<String, Vec<Disclosure>>,
    fallback: Vec<Disclosure>,
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl DisclosureRegistry {
    pub fn new(generic: Vec<Disclosure>, fallback: Vec<Disclosure>) -> Self {
        Self {
            generic,
            jurisdictions: BTreeMap::new(),
            fallback,
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::new(
            vec![
                Disclosure::new(
                    "lease_terms",
                    "Lease terms",
                    "I have read the lease, including rent, term, deposit, and house rules.",
                ),
                Disclosure::new(
                    "electronic_signature_consent",
                    "Electronic signature",
                    "I agree that my electronic signature is as binding as a handwritten one.",
                ),
                Disclosure::new(
                    "lead_based_paint",
                    "Lead-based paint",
                    "I received the federal lead-based paint disclosure for housing built before 1978.",
                ),
            ],
            vec![Disclosure::new(
                "state_law_notice",
                "State landlord-tenant law",
                "I understand that the landlord-tenant laws of the state where the unit is located govern this lease.",
            )],
        );

        registry
            .register(
                "CA",
                vec![
                    Disclosure::new(
                        "ca_bed_bug_information",
                        "Bed bug information",
                        "I received the California bed bug information sheet (Civil Code 1954.603).",
                    ),
                    Disclosure::new(
                        "ca_megans_law",
                        "Megan's Law database",
                        "I was notified of the California Department of Justice sex offender database.",
                    ),
                ],
            )
            .register(
                "NY",
                vec![
                    Disclosure::new(
                        "ny_sprinkler_system",
                        "Sprinkler system",
                        "I was informed whether the premises has a maintained sprinkler system.",
                    ),
                    Disclosure::new(
                        "ny_bed_bug_history",
                        "Bed bug history",
                        "I received the one-year bed bug infestation history of the building.",
                    ),
                ],
            )
            .register(
                "TX",
                vec![Disclosure::new(
                    "tx_flood_disclosure",
                    "Flood disclosure",
                    "I received the Texas flood disclosure notice (Property Code 92.0135).",
                )],
            )
            .register(
                "FL",
                vec![Disclosure::new(
                    "fl_radon_gas",
                    "Radon gas",
                    "I received the Florida radon gas notification.",
                )],
            )
            .register(
                "IA",
                vec![Disclosure::new(
                    "ia_security_deposit",
                    "Security deposit",
                    "I understand the deposit is capped at two months' rent and returned within 30 days of move-out.",
                )],
            )
            .register(
                "IL",
                vec![Disclosure::new(
                    "il_security_deposit_interest",
                    "Security deposit interest",
                    "I was informed of the interest owed on security deposits where applicable.",
                )],
            );

        registry
    }

    /// Add or replace the disclosures for one jurisdiction.
    pub fn register(&mut self, code: &str, disclosures: Vec<Disclosure>) -> &mut Self {
        self.jurisdictions.insert(normalize(code), disclosures);
        self
    }

    pub fn is_mapped(&self, code: &str) -> bool {
        self.jurisdictions.contains_key(&normalize(code))
    }

    /// Jurisdiction-specific disclosures, or the generic fallback when the code is unmapped.
    pub fn jurisdiction(&self, code: &str) -> &[Disclosure] {
        self.jurisdictions
            .get(&normalize(code))
            .map(Vec::as_slice)
            .unwrap_or(self.fallback.as_slice())
    }

    /// Everything a signer must acknowledge for a lease in `code`.
    pub fn required_for(&self, code: &str) -> Vec<&Disclosure> {
        self.generic
            .iter()
            .chain(self.jurisdiction(code).iter())
            .collect()
    }

    /// Keys of required disclosures not acknowledged with `true`.
    pub fn missing_acknowledgments(
        &self,
        code: &str,
        acknowledgments: &BTreeMap<String, bool>,
    ) -> Vec<String> {
        self.required_for(code)
            .into_iter()
            .filter(|disclosure| acknowledgments.get(&disclosure.key) != Some(&true))
            .map(|disclosure| disclosure.key.clone())
            .collect()
    }
}

impl Default for DisclosureRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acknowledge_all(registry: &DisclosureRegistry, code: &str) -> BTreeMap<String, bool> {
        registry
            .required_for(code)
            .into_iter()
            .map(|disclosure| (disclosure.key.clone(), true))
            .collect()
    }

    #[test]
    fn mapped_codes_add_state_specific_disclosures() {
        let registry = DisclosureRegistry::standard();
        let keys: Vec<_> = registry
            .required_for("CA")
            .into_iter()
            .map(|disclosure| disclosure.key.as_str())
            .collect();
        assert!(keys.contains(&"lease_terms"));
        assert!(keys.contains(&"ca_bed_bug_information"));
        assert!(!keys.contains(&"state_law_notice"));
    }

    #[test]
    fn codes_are_normalized() {
        let registry = DisclosureRegistry::standard();
        assert!(registry.is_mapped(" ny "));
        assert_eq!(registry.jurisdiction("ny"), registry.jurisdiction("NY"));
    }

    #[test]
    fn unmapped_codes_fall_back_to_generic_state_notice() {
        let registry = DisclosureRegistry::standard();
        assert!(!registry.is_mapped("ZZ"));
        let keys: Vec<_> = registry
            .jurisdiction("ZZ")
            .iter()
            .map(|disclosure| disclosure.key.as_str())
            .collect();
        assert_eq!(keys, vec!["state_law_notice"]);
    }

    #[test]
    fn registering_a_jurisdiction_is_additive() {
        let mut registry = DisclosureRegistry::standard();
        registry.register(
            "wa",
            vec![Disclosure::new(
                "wa_mold",
                "Mold",
                "I received the Washington mold information pamphlet.",
            )],
        );
        assert!(registry.is_mapped("WA"));
        assert!(registry.is_mapped("CA"));
    }

    #[test]
    fn false_or_missing_acknowledgments_are_reported() {
        let registry = DisclosureRegistry::standard();
        let mut acknowledgments = acknowledge_all(&registry, "TX");
        assert!(registry
            .missing_acknowledgments("TX", &acknowledgments)
            .is_empty());

        acknowledgments.insert("tx_flood_disclosure".to_string(), false);
        acknowledgments.remove("lease_terms");
        assert_eq!(
            registry.missing_acknowledgments("TX", &acknowledgments),
            vec!["lease_terms".to_string(), "tx_flood_disclosure".to_string()]
        );
    }
}
