#![forbid(unsafe_code)]

use std::{env, net::SocketAddr};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use folio_adapter::{
    AdapterErrorResponse, AdapterFailure, AdapterFailureClass, AdapterHealthResponse,
    AdapterRuntime, CreateLibraryAdapterRequest, CreateLibraryAdapterResponse,
    NavigationAdapterResponse, SelectAdapterRequest, VisiblePathResponse,
};
use tracing_subscriber::EnvFilter;

type Reply<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<AdapterErrorResponse>)>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bind = env::var("FOLIO_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
    let addr: SocketAddr = bind.parse()?;
    let runtime = AdapterRuntime::default_from_env()?;

    let outcome = runtime.refresh().await;
    if let Err(err) = outcome {
        tracing::warn!(reason = %err.reason, "initial library load failed");
    }

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/path", get(visible_path))
        .route("/v1/select", post(select))
        .route("/v1/libraries", post(create_library))
        .route("/v1/refresh", post(refresh))
        .with_state(runtime);

    tracing::info!(%addr, "folio_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn status_for(failure: &AdapterFailure) -> StatusCode {
    match failure.class {
        AdapterFailureClass::BadRequest => StatusCode::BAD_REQUEST,
        AdapterFailureClass::NotFound => StatusCode::NOT_FOUND,
        AdapterFailureClass::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
        AdapterFailureClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T>(result: Result<T, AdapterFailure>) -> Reply<T> {
    match result {
        Ok(body) => Ok((StatusCode::OK, Json(body))),
        Err(failure) => {
            tracing::warn!(reason = %failure.reason, "request rejected");
            Err((status_for(&failure), Json(failure.to_response())))
        }
    }
}

async fn healthz(State(runtime): State<AdapterRuntime>) -> Reply<AdapterHealthResponse> {
    reply(runtime.health_report())
}

async fn visible_path(State(runtime): State<AdapterRuntime>) -> Reply<VisiblePathResponse> {
    reply(runtime.visible_path())
}

async fn select(
    State(runtime): State<AdapterRuntime>,
    Json(request): Json<SelectAdapterRequest>,
) -> Reply<NavigationAdapterResponse> {
    reply(runtime.select(request).await)
}

async fn create_library(
    State(runtime): State<AdapterRuntime>,
    Json(request): Json<CreateLibraryAdapterRequest>,
) -> Reply<CreateLibraryAdapterResponse> {
    reply(runtime.create_library(request).await)
}

async fn refresh(State(runtime): State<AdapterRuntime>) -> Reply<NavigationAdapterResponse> {
    reply(runtime.refresh().await)
}
