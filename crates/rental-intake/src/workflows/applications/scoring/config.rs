use serde::{Deserialize, Serialize};

use super::super::domain::DocumentKind;

/// Category weights and thresholds for the eligibility breakdown.
///
/// Ratios are expressed in hundredths (`300` is an income of three times the rent) so scoring
/// stays in integer arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub income_weight: u16,
    pub credit_weight: u16,
    pub rental_history_weight: u16,
    pub employment_weight: u16,
    pub documents_weight: u16,
    pub target_income_ratio: u32,
    pub minimum_income_ratio: u32,
    pub minimum_rental_months: u16,
    pub stable_employment_months: u16,
    pub required_documents: Vec<DocumentKind>,
}

impl ScoringConfig {
    pub fn max_score(&self) -> u16 {
        self.income_weight
            .saturating_add(self.credit_weight)
            .saturating_add(self.rental_history_weight)
            .saturating_add(self.employment_weight)
            .saturating_add(self.documents_weight)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            income_weight: 30,
            credit_weight: 25,
            rental_history_weight: 20,
            employment_weight: 15,
            documents_weight: 10,
            target_income_ratio: 300,
            minimum_income_ratio: 250,
            minimum_rental_months: 12,
            stable_employment_months: 24,
            required_documents: vec![DocumentKind::GovernmentId, DocumentKind::PayStub],
        }
    }
}
