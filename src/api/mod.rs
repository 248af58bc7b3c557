use crate::{
    api::handlers::{api_key, audit, health, register, login, me, token, session, mfa, password},
    audit::{AuditSink, AuditWorkerConfig},
    config::AuthConfig,
    rate_limit::WindowRateLimiter,
    service::AuthService,
    store::{AuthStore, PgStore},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;
use url::Url;

pub(crate) mod handlers;
mod openapi;

pub use openapi::openapi;

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, config: AuthConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgStore::new(pool));

    // Hourly sweep of refresh-token records past their expiry.
    let sweep_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            interval.tick().await;
            match sweep_store.prune_expired_refresh_tokens().await {
                Ok(0) => {}
                Ok(pruned) => info!("pruned {pruned} expired refresh tokens"),
                Err(err) => warn!("refresh token sweep failed: {err:#}"),
            }
        }
    });

    let (audit, _audit_worker) = AuditSink::spawn(store.clone(), AuditWorkerConfig::default());
    let config = Arc::new(config);
    let limiter = Arc::new(WindowRateLimiter::from_config(&config));
    let service = Arc::new(
        AuthService::new(store, config.clone(), limiter, audit)
            .map_err(|err| anyhow!("failed to build auth service: {err}"))?,
    );

    let frontend_origin = frontend_origin(config.frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router()
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(service)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

#[must_use]
pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/health", get(health::health))
        .route("/v1/auth/register", post(register::register))
        .route("/v1/auth/login", post(login::login))
        .route("/v1/auth/refresh", post(token::refresh))
        .route("/v1/auth/logout", post(token::logout))
        .route("/v1/auth/password", post(password::change_password))
        .route("/v1/auth/me", get(me::me))
        .route("/v1/auth/audit", get(audit::audit_trail))
        .route(
            "/v1/auth/api-keys",
            get(api_key::list_api_keys).post(api_key::create_api_key),
        )
        .route(
            "/v1/auth/api-keys/:id",
            axum::routing::delete(api_key::revoke_api_key),
        )
        .route("/v1/auth/sessions", get(session::list_sessions))
        .route(
            "/v1/auth/sessions/:id",
            axum::routing::delete(session::revoke_session),
        )
        .route("/v1/auth/sessions/revoke-all", post(session::revoke_all_sessions))
        .route("/v1/auth/mfa/enroll", post(mfa::enroll))
        .route("/v1/auth/mfa/confirm", post(mfa::confirm))
        .route("/v1/auth/mfa/disable", post(mfa::disable))
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path_and_keeps_port() {
        let origin = frontend_origin("http://localhost:3000/app").unwrap();
        assert_eq!(origin, HeaderValue::from_static("http://localhost:3000"));
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
