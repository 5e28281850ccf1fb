//! HTTP routes
//!
//! Thin wrapper around [`Dispatcher::execute`]: decode the body, run the
//! command off the async runtime, encode the envelope.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;
use crate::protocol::{Reply, Request};

/// Build the service router
pub fn build_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/data", post(handle_data))
        .route("/", post(health_check))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Any origin, GET and POST, `Origin` and `Content-Type` request headers
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE])
}

/// Handle a command request
///
/// Missing fields default; a body that is not a JSON object of the request
/// shape (including one that is not UTF-8) is answered with a 500 error
/// envelope.
async fn handle_data(State(dispatcher): State<Dispatcher>, body: Bytes) -> Response {
    let request: Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Rejecting undecodable request body: {}", e);
            return into_response(Reply::failure(500, e.to_string()));
        }
    };

    let reply = match tokio::task::spawn_blocking(move || dispatcher.execute(&request)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!("Command task failed: {}", e);
            Reply::failure(500, "internal error")
        }
    };

    into_response(reply)
}

async fn health_check() -> &'static str {
    "ok"
}

fn into_response(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.envelope)).into_response()
}
