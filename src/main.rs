use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use kube::Client;
use prometheus::{Encoder, TextEncoder};
use scale_to_zero::postgres::pg_probe_factory;
use scale_to_zero::sidecar::{KubeClusterStore, ScaleToZero, State};
use scale_to_zero::util::telemetry;
use scale_to_zero::Config;
use tokio::signal::unix::{signal, SignalKind};
use tracing::*;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok().content_type(encoder.format_type()).body(buffer),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for SIGINT: {}", e);
            }
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init(&config.log_level)?;
    info!(
        "Starting scale to zero sidecar for cluster {} on pod {}",
        config.cluster, config.pod_name
    );

    let client = Client::try_default().await?;
    let store = KubeClusterStore::new(client, &config);

    // Initialize sidecar state
    let state = State::default();
    let sidecar = ScaleToZero::new(&config, Box::new(store), pg_probe_factory(), state.to_context()?).await?;

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind(config.metrics_bind_address.as_str())?
    .disable_signals()
    .shutdown_timeout(5)
    .run();
    let server_handle = server.handle();

    // The control loop owns shutdown; the web server stops when the loop returns
    let sidecar = async move {
        sidecar.run(shutdown_signal()).await;
        server_handle.stop(true).await;
    };

    tokio::join!(sidecar, server).1?;
    Ok(())
}
