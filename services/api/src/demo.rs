use crate::infra::{
    InMemoryApplicationRepository, InMemoryNotificationPublisher, SimulatedOutcome,
    SimulatedPaymentGateway, StaticListingDirectory,
};
use chrono::{Duration, Local};
use clap::Args;
use rental_intake::config::LifecycleConfig;
use rental_intake::error::AppError;
use rental_intake::workflows::applications::{
    Actor, ApplicantDetails, ApplicationId, ApplicationLifecycleService, ApplicationStatus,
    CreditTier, DocumentKind, DocumentReference, EmploymentRecord, EmploymentStatus,
    ListingDirectory, ListingId, LifecycleError, RentalHistoryEntry, RequirementDraft,
    RequirementKind, ScoringConfig, TransitionRequest, VerificationRequest,
};
use rental_intake::workflows::lease::SignatureSubmission;
use std::path::PathBuf;
use std::sync::Arc;

type DemoService = ApplicationLifecycleService<
    InMemoryApplicationRepository,
    InMemoryNotificationPublisher,
    StaticListingDirectory,
>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Listing to apply for (listing-ca-101, listing-ny-220, listing-tx-305)
    #[arg(long, default_value = "listing-ca-101")]
    pub(crate) listing: String,
    /// Outcome reported by the simulated payment gateway
    #[arg(long, value_enum, default_value_t = SimulatedOutcome::Decline)]
    pub(crate) payment_outcome: SimulatedOutcome,
    /// Route the application through a conditional approval before approving
    #[arg(long)]
    pub(crate) conditional: bool,
    /// Write the CSV history to this path instead of stdout
    #[arg(long)]
    pub(crate) history_csv: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        listing,
        payment_outcome,
        conditional,
        history_csv,
    } = args;

    let listings = StaticListingDirectory::sample();
    let listing_id = ListingId(listing);
    let Some(listing) = listings
        .listing(&listing_id)
        .map_err(LifecycleError::from)?
    else {
        println!("Unknown listing {}", listing_id.0);
        return Ok(());
    };

    let notifications = Arc::new(InMemoryNotificationPublisher::default());
    let service: DemoService = ApplicationLifecycleService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        notifications.clone(),
        Arc::new(listings),
        Arc::new(SimulatedPaymentGateway::new(payment_outcome)),
        ScoringConfig::default(),
        LifecycleConfig::default(),
    );

    let applicant = Actor::applicant("demo-applicant");
    let reviewer = Actor::landlord("demo-landlord");

    println!("Rental application lifecycle demo");
    println!(
        "- Listing {} ({}) | rent ${} | application fee ${}",
        listing.listing_id.0, listing.state_code, listing.monthly_rent, listing.application_fee
    );

    let application = service.create_application(&applicant, listing_id, demo_details())?;
    let id = application.id.clone();
    println!("- Draft {} opened by {}", id.0, applicant.id.0);

    service.request_transition(
        &id,
        &applicant,
        TransitionRequest::to(ApplicationStatus::PendingPayment),
    )?;

    let (application, attempt) = service.submit_payment(&id, &applicant)?;
    println!(
        "- Automated payment {} -> {}{}",
        attempt.reference_id,
        attempt.status.label(),
        attempt
            .error_message
            .as_deref()
            .map(|message| format!(" ({message})"))
            .unwrap_or_default()
    );

    if !application.payments.is_paid() {
        let verification = service.verify_payment(
            &id,
            &reviewer,
            VerificationRequest {
                reference_id: None,
                amount: Some(listing.application_fee),
                payment_method: Some("money order".to_string()),
                received_at: Some(chrono::Utc::now()),
                internal_note: Some("dropped at leasing office".to_string()),
                confirmed: true,
            },
        )?;
        println!(
            "- Manual verification {} recorded by {}",
            verification.reference_id, verification.verified_by.0
        );
    }
    print_status(&service, &id, &reviewer)?;

    let breakdown = service.calculate_score(&id, &reviewer)?;
    println!(
        "- Score {}/{} (income {}, credit {}, rental {}, employment {}, documents {})",
        breakdown.total_score,
        breakdown.max_score,
        breakdown.income_score,
        breakdown.credit_score,
        breakdown.rental_history_score,
        breakdown.employment_score,
        breakdown.documents_score
    );
    if !breakdown.flags.is_empty() {
        println!("  Flags: {}", breakdown.flags.join(", "));
    }

    service.request_transition(
        &id,
        &reviewer,
        TransitionRequest::to(ApplicationStatus::UnderReview),
    )?;
    service.add_comment(&id, &reviewer, "References called; both positive.")?;

    if conditional {
        let due = Local::now().date_naive() + Duration::days(7);
        let application = service.request_transition(
            &id,
            &reviewer,
            TransitionRequest::to(ApplicationStatus::ConditionalApproval)
                .with_reason("co-signer required")
                .with_requirements(
                    vec![RequirementDraft {
                        kind: RequirementKind::Document,
                        description: "Signed co-signer agreement".to_string(),
                        required: true,
                    }],
                    Some(due),
                ),
        )?;
        for requirement in application.requirements.items() {
            service.mark_requirement_satisfied(
                &id,
                &requirement.id,
                &reviewer,
                Some("received by email".to_string()),
            )?;
            println!("- Requirement {} satisfied", requirement.id);
        }
    }

    service.request_transition(
        &id,
        &reviewer,
        TransitionRequest::to(ApplicationStatus::Approved).with_reason("meets screening criteria"),
    )?;
    print_status(&service, &id, &applicant)?;

    for (actor, name) in [(&applicant, "Avery Applicant"), (&reviewer, "Lee Landlord")] {
        let submission = signature(&service, &listing.state_code, name);
        let status = service.sign_lease(&id, actor, submission)?;
        println!("- {name} signed the lease -> {}", status.label());
    }

    println!("- Notifications:");
    for notification in notifications.events() {
        println!("    - {}", notification.template);
    }

    let csv = service.export_history_csv(&id, &reviewer)?;
    match history_csv {
        Some(path) => {
            std::fs::write(&path, csv)?;
            println!("- History written to {}", path.display());
        }
        None => println!("\nHistory\n{csv}"),
    }

    Ok(())
}

fn print_status(
    service: &DemoService,
    id: &ApplicationId,
    viewer: &Actor,
) -> Result<(), LifecycleError> {
    let view = service.get(id, viewer)?;
    match serde_json::to_string(&view) {
        Ok(json) => println!("  Status: {json}"),
        Err(err) => println!("  Status payload unavailable: {err}"),
    }
    Ok(())
}

fn signature(service: &DemoService, state_code: &str, name: &str) -> SignatureSubmission {
    SignatureSubmission {
        signer_name: name.to_string(),
        signature_image_data: format!(
            "data:image/png;base64,{}",
            "iVBORw0KGgoAAAANSUhEUg".repeat(6)
        ),
        disclosure_acknowledgments: service
            .signing()
            .registry()
            .required_for(state_code)
            .into_iter()
            .map(|disclosure| (disclosure.key.clone(), true))
            .collect(),
        ip_address: Some("203.0.113.24".to_string()),
    }
}

fn demo_details() -> ApplicantDetails {
    ApplicantDetails {
        monthly_income: 8200,
        credit_tier: Some(CreditTier::Good),
        rental_history: vec![RentalHistoryEntry {
            address: "55 Alder Lane".to_string(),
            landlord_contact: Some("alder-lane-mgmt@example.com".to_string()),
            monthly_rent: 2100,
            months: 26,
            late_payments: 0,
            evicted: false,
        }],
        employment: Some(EmploymentRecord {
            status: EmploymentStatus::Employed,
            employer: Some("Northgate Health".to_string()),
            months_employed: 31,
        }),
        documents: vec![
            DocumentReference {
                kind: DocumentKind::GovernmentId,
                storage_key: "demo/id.png".to_string(),
            },
            DocumentReference {
                kind: DocumentKind::PayStub,
                storage_key: "demo/paystub.pdf".to_string(),
            },
        ],
    }
}
