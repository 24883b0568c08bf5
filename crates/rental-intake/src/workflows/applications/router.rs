use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, ActorId, ApplicantDetails, ApplicationId, ListingId, Role};
use super::engine::TransitionRequest;
use super::error::{ErrorBody, ErrorKind, LifecycleError};
use super::payments::VerificationRequest;
use super::repository::{ApplicationRepository, ListingDirectory, NotificationPublisher};
use super::service::ApplicationLifecycleService;
use crate::workflows::lease::{LeaseDraft, SignatureSubmission};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<R, N, L> = Arc<ApplicationLifecycleService<R, N, L>>;

/// Router builder exposing the lifecycle operations over HTTP.
pub fn application_router<R, N, L>(service: SharedService<R, N, L>) -> Router
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(create_handler::<R, N, L>))
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/details",
            put(details_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/transitions",
            post(transition_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/score",
            post(score_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/payments",
            post(payment_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/payments/verifications",
            post(verification_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/requirements/:requirement_id/satisfy",
            post(satisfy_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/comments",
            post(comment_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/history",
            get(history_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/history/export",
            get(export_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/lease/signatures",
            post(sign_handler::<R, N, L>),
        )
        .route(
            "/api/v1/applications/:application_id/lease/draft",
            get(load_draft_handler::<R, N, L>).put(save_draft_handler::<R, N, L>),
        )
        .with_state(service)
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidTransition
        | ErrorKind::PreconditionNotMet
        | ErrorKind::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict
        | ErrorKind::DuplicateReference
        | ErrorKind::AlreadyVerified
        | ErrorKind::AlreadySigned => StatusCode::CONFLICT,
        ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: &LifecycleError) -> Response {
    let body = ErrorBody::from(error);
    let payload = json!({ "error": body });
    (status_for(body.kind), Json(payload)).into_response()
}

/// Resolve the caller from identity headers set by the upstream identity provider.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let unauthenticated = |message: &str| {
        let payload = json!({
            "error": { "kind": "unauthenticated", "message": message },
        });
        (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
    };

    let id = read(ACTOR_ID_HEADER).ok_or_else(|| unauthenticated("missing actor id"))?;
    let role = read(ACTOR_ROLE_HEADER)
        .and_then(Role::parse)
        .ok_or_else(|| unauthenticated("missing or unknown actor role"))?;

    Ok(Actor {
        id: ActorId(id.to_string()),
        role,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateApplicationRequest {
    pub listing_id: ListingId,
    #[serde(default)]
    pub details: ApplicantDetails,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SatisfyRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentRequest {
    pub body: String,
}

pub(crate) async fn create_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    headers: HeaderMap,
    Json(request): Json<CreateApplicationRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.create_application(&actor, request.listing_id, request.details) {
        Ok(application) => (StatusCode::CREATED, Json(application.status_view())).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn status_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.get(&ApplicationId(application_id), &actor) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn details_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(details): Json<ApplicantDetails>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.update_details(&ApplicationId(application_id), &actor, details) {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn transition_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.request_transition(&ApplicationId(application_id), &actor, request) {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn score_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.calculate_score(&ApplicationId(application_id), &actor) {
        Ok(breakdown) => (StatusCode::OK, Json(breakdown)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn payment_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.submit_payment(&ApplicationId(application_id), &actor) {
        Ok((application, attempt)) => {
            let payload = json!({
                "attempt": attempt,
                "application": application.status_view(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn verification_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<VerificationRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.verify_payment(&ApplicationId(application_id), &actor, request) {
        Ok(verification) => (StatusCode::CREATED, Json(verification)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn satisfy_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path((application_id, requirement_id)): Path<(String, String)>,
    headers: HeaderMap,
    request: Option<Json<SatisfyRequest>>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let notes = request.and_then(|Json(request)| request.notes);
    match service.mark_requirement_satisfied(
        &ApplicationId(application_id),
        &requirement_id,
        &actor,
        notes,
    ) {
        Ok(requirement) => (StatusCode::OK, Json(requirement)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn comment_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CommentRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.add_comment(&ApplicationId(application_id), &actor, &request.body) {
        Ok(comment) => (StatusCode::CREATED, Json(comment)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn history_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match service.history(&id, &actor) {
        Ok(events) => {
            let payload = json!({
                "application_id": id,
                "events": events,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn export_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.export_history_csv(&ApplicationId(application_id), &actor) {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn sign_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<SignatureSubmission>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.sign_lease(&ApplicationId(application_id), &actor, submission) {
        Ok(status) => {
            let payload = json!({ "lease_signature_status": status });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn load_draft_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.lease_draft(&ApplicationId(application_id), &actor) {
        Ok(draft) => (StatusCode::OK, Json(json!({ "draft": draft }))).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn save_draft_handler<R, N, L>(
    State(service): State<SharedService<R, N, L>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<LeaseDraft>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
    L: ListingDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.save_lease_draft(&ApplicationId(application_id), &actor, draft) {
        Ok(draft) => (StatusCode::OK, Json(json!({ "draft": draft }))).into_response(),
        Err(error) => error_response(&error),
    }
}
