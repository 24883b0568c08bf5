use super::super::domain::{
    CreditTier, DocumentKind, DocumentReference, EmploymentRecord, EmploymentStatus,
    RentalHistoryEntry,
};
use super::config::ScoringConfig;

const RENTAL_TENURE_POINTS: u32 = 8;
const RENTAL_REFERENCE_POINTS: u32 = 4;
const RENTAL_QUALITY_POINTS: u32 = 8;
const RENTAL_RAW_MAX: u32 = RENTAL_TENURE_POINTS + RENTAL_REFERENCE_POINTS + RENTAL_QUALITY_POINTS;

/// `weight * numerator / denominator`, rounded down.
fn portion(weight: u16, numerator: u32, denominator: u32) -> u16 {
    if denominator == 0 {
        return 0;
    }
    let scaled = u64::from(weight) * u64::from(numerator.min(denominator)) / u64::from(denominator);
    scaled as u16
}

pub(crate) fn income_score(
    monthly_income: u32,
    monthly_rent: u32,
    config: &ScoringConfig,
    flags: &mut Vec<String>,
) -> u16 {
    if monthly_rent == 0 {
        flags.push("rent_unavailable".to_string());
        return 0;
    }
    if monthly_income == 0 {
        flags.push("income_not_reported".to_string());
        flags.push("income_ratio_below_threshold".to_string());
        return 0;
    }

    let ratio = u64::from(monthly_income) * 100 / u64::from(monthly_rent);
    let target = u64::from(config.target_income_ratio);
    let minimum = u64::from(config.minimum_income_ratio);

    if ratio < minimum {
        flags.push("income_ratio_below_threshold".to_string());
    }

    if ratio >= target {
        config.income_weight
    } else if ratio >= minimum {
        portion(config.income_weight, 70, 100)
    } else if ratio * 5 >= minimum * 4 {
        // Within 80% of the minimum still earns partial credit.
        portion(config.income_weight, 40, 100)
    } else {
        0
    }
}

pub(crate) fn credit_score(
    tier: Option<CreditTier>,
    config: &ScoringConfig,
    flags: &mut Vec<String>,
) -> u16 {
    let percent = match tier.unwrap_or(CreditTier::Unreported) {
        CreditTier::Excellent => 100,
        CreditTier::Good => 80,
        CreditTier::Fair => 50,
        CreditTier::Poor => {
            flags.push("poor_credit".to_string());
            20
        }
        CreditTier::Unreported => {
            flags.push("credit_unreported".to_string());
            0
        }
    };
    portion(config.credit_weight, percent, 100)
}

pub(crate) fn rental_history_score(
    history: &[RentalHistoryEntry],
    config: &ScoringConfig,
    flags: &mut Vec<String>,
) -> u16 {
    if history.is_empty() {
        flags.push("no_rental_history".to_string());
        return 0;
    }

    let total_months: u32 = history.iter().map(|entry| u32::from(entry.months)).sum();
    let minimum = u32::from(config.minimum_rental_months);
    let tenure = if total_months >= minimum * 2 {
        RENTAL_TENURE_POINTS
    } else if total_months >= minimum {
        5
    } else {
        flags.push("short_rental_history".to_string());
        2
    };

    let with_reference = history
        .iter()
        .filter(|entry| {
            entry
                .landlord_contact
                .as_deref()
                .map(|contact| !contact.trim().is_empty())
                .unwrap_or(false)
        })
        .count() as u32;
    if with_reference < history.len() as u32 {
        flags.push("missing_landlord_reference".to_string());
    }
    let references = RENTAL_REFERENCE_POINTS * with_reference / history.len() as u32;

    let quality = if history.iter().any(|entry| entry.evicted) {
        flags.push("eviction_history".to_string());
        0
    } else {
        let late: u32 = history
            .iter()
            .map(|entry| u32::from(entry.late_payments))
            .sum();
        if late > 0 {
            flags.push("late_payments".to_string());
        }
        RENTAL_QUALITY_POINTS.saturating_sub(late.saturating_mul(2))
    };

    portion(
        config.rental_history_weight,
        tenure + references + quality,
        RENTAL_RAW_MAX,
    )
}

pub(crate) fn employment_score(
    employment: Option<&EmploymentRecord>,
    config: &ScoringConfig,
    flags: &mut Vec<String>,
) -> u16 {
    let Some(record) = employment else {
        flags.push("employment_not_reported".to_string());
        return 0;
    };

    let percent = match record.status {
        EmploymentStatus::Unemployed => {
            flags.push("unemployed".to_string());
            0
        }
        EmploymentStatus::Retired => 100,
        EmploymentStatus::Student => 40,
        EmploymentStatus::Employed | EmploymentStatus::SelfEmployed => {
            let months = u32::from(record.months_employed);
            let stable = u32::from(config.stable_employment_months);
            if months >= stable {
                100
            } else if months * 2 >= stable {
                70
            } else if months >= 6 {
                40
            } else {
                flags.push("short_employment_tenure".to_string());
                20
            }
        }
    };

    portion(config.employment_weight, percent, 100)
}

pub(crate) fn documents_score(
    documents: &[DocumentReference],
    config: &ScoringConfig,
    flags: &mut Vec<String>,
) -> u16 {
    let has = |kind: DocumentKind| documents.iter().any(|document| document.kind == kind);

    let required_total = config.required_documents.len() as u32;
    let mut required_present = 0u32;
    for kind in &config.required_documents {
        if has(*kind) {
            required_present += 1;
        } else {
            flags.push(format!("missing_document:{}", kind.label()));
        }
    }

    let required_points = if required_total == 0 {
        portion(config.documents_weight, 70, 100)
    } else {
        let share = u64::from(config.documents_weight) * 70 * u64::from(required_present)
            / (100 * u64::from(required_total));
        share as u16
    };

    let supporting = documents.iter().any(|document| {
        document.kind != DocumentKind::Other && !config.required_documents.contains(&document.kind)
    });
    let supporting_points = if supporting {
        config.documents_weight - portion(config.documents_weight, 70, 100)
    } else {
        0
    };

    required_points + supporting_points
}
