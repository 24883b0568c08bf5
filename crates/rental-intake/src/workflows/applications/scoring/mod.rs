mod config;
mod rules;

pub use config::ScoringConfig;

use serde::{Deserialize, Serialize};

use super::domain::ApplicantDetails;

/// Point-in-time view of the data scoring reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationSnapshot<'a> {
    pub monthly_rent: u32,
    pub details: &'a ApplicantDetails,
}

/// Category breakdown persisted on the application. It is a snapshot: later edits to the
/// application do not change it until a reviewer recomputes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub income_score: u16,
    pub credit_score: u16,
    pub rental_history_score: u16,
    pub employment_score: u16,
    pub documents_score: u16,
    pub total_score: u16,
    pub max_score: u16,
    pub flags: Vec<String>,
}

impl ScoreBreakdown {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|candidate| candidate == flag)
    }
}

/// Stateless evaluator that applies the weights to an application snapshot.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn calculate(&self, snapshot: &ApplicationSnapshot<'_>) -> ScoreBreakdown {
        let mut flags = Vec::new();
        let details = snapshot.details;

        let income_score = rules::income_score(
            details.monthly_income,
            snapshot.monthly_rent,
            &self.config,
            &mut flags,
        );
        let credit_score = rules::credit_score(details.credit_tier, &self.config, &mut flags);
        let rental_history_score =
            rules::rental_history_score(&details.rental_history, &self.config, &mut flags);
        let employment_score =
            rules::employment_score(details.employment.as_ref(), &self.config, &mut flags);
        let documents_score = rules::documents_score(&details.documents, &self.config, &mut flags);

        let max_score = self.config.max_score();
        let total_score = [
            income_score,
            credit_score,
            rental_history_score,
            employment_score,
            documents_score,
        ]
        .into_iter()
        .fold(0u16, u16::saturating_add)
        .min(max_score);

        ScoreBreakdown {
            income_score,
            credit_score,
            rental_history_score,
            employment_score,
            documents_score,
            total_score,
            max_score,
            flags,
        }
    }
}
