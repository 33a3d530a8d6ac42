use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use crate::telemetry::installed_recorder;
use std::{io, net::SocketAddr};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::info;

/// Return a 404 Not Found response
pub async fn return_404() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Return a 200 OK response
pub async fn return_200() -> Response {
    (StatusCode::OK, "ok").into_response()
}

/// Render the installed metrics recorder, or 404 if none is installed.
pub async fn return_metrics() -> Response {
    match installed_recorder() {
        Some(recorder) => (StatusCode::OK, recorder.render()).into_response(),
        None => return_404().await,
    }
}

/// The healthcheck router. `GET /healthcheck` answers 200, `GET /metrics`
/// serves the metrics snapshot, everything else 404.
pub fn router() -> Router {
    Router::new()
        .route("/healthcheck", get(return_200))
        .route("/metrics", get(return_metrics))
        .fallback(return_404)
}

/// Bind the healthcheck server to `socket` and serve it in the background.
///
/// Returns the bound address, which differs from `socket` when binding to
/// port 0.
pub async fn serve_healthcheck(
    socket: impl Into<SocketAddr>,
) -> io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(socket.into()).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "serving healthcheck");

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router()).await {
            tracing::error!(%err, "serve failed");
        }
    });
    Ok((addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn healthcheck_answers_ok() {
        let (addr, handle) = serve_healthcheck((Ipv4Addr::LOCALHOST, 0)).await.unwrap();

        let ok = reqwest::get(format!("http://{addr}/healthcheck")).await.unwrap();
        assert_eq!(ok.status(), reqwest::StatusCode::OK);

        let missing = reqwest::get(format!("http://{addr}/nope")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        handle.abort();
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_installed_recorder() {
        let recorder = crate::telemetry::install_recorder();
        metrics::counter!("relay.submitted_blocks").increment(1);
        assert!(recorder.counter_value("relay.submitted_blocks").is_some());

        let (addr, handle) = serve_healthcheck((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let res = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert!(res.text().await.unwrap().contains("relay.submitted_blocks "));

        handle.abort();
    }
}
