//! The plain-HTTP listener that exists only to 301-redirect to the HTTPS
//! origin, active when TLS is configured.

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;

#[derive(Clone)]
struct RedirectState {
    public_host: String,
}

async fn redirect_to_https(State(state): State<RedirectState>, uri: Uri) -> impl IntoResponse {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let target = format!("https://{}{}", state.public_host, path_and_query);
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, target)])
}

/// Spawns the redirect listener on `bind_addr` as a background task.
pub async fn spawn(bind_addr: std::net::SocketAddr, public_host: String) -> anyhow::Result<()> {
    let state = RedirectState { public_host };
    let app = Router::new()
        .route("/*path", any(redirect_to_https))
        .route("/", any(redirect_to_https))
        .with_state(state);

    tokio::spawn(async move {
        let result = axum::Server::bind(&bind_addr)
            .serve(app.into_make_service())
            .await;
        if let Err(err) = result {
            tracing::error!(error = %err, "TLS redirect listener stopped");
        }
    });
    Ok(())
}
