use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryApplicationRepository, InMemoryNotificationPublisher,
    SimulatedPaymentGateway, StaticListingDirectory,
};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rental_intake::config::AppConfig;
use rental_intake::error::AppError;
use rental_intake::telemetry;
use rental_intake::workflows::applications::{ApplicationLifecycleService, ScoringConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = Arc::new(ApplicationLifecycleService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(InMemoryNotificationPublisher::default()),
        Arc::new(StaticListingDirectory::sample()),
        Arc::new(SimulatedPaymentGateway::new(args.payment_outcome)),
        ScoringConfig::default(),
        config.lifecycle.clone(),
    ));

    let app = with_application_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        payment_outcome = ?args.payment_outcome,
        "rental intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
