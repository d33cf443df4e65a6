use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use tenantry_backend::config::{BillingProviderKind, Config};
use tenantry_backend::db::{
    postgres_activity_repository::PostgresActivityRepository,
    postgres_api_key_repository::PostgresApiKeyRepository,
    postgres_billing_event_repository::PostgresBillingEventRepository,
    postgres_session_repository::PostgresSessionRepository,
    postgres_user_repository::PostgresUserRepository,
    postgres_workspace_repository::PostgresWorkspaceRepository,
};
use tenantry_backend::responses::JsonResponse;
use tenantry_backend::routes;
use tenantry_backend::services::auth_hooks::SessionAuditHooks;
use tenantry_backend::services::billing::{
    BillingProvider, BillingService, ChargebeeBillingProvider, StripeBillingProvider,
};
use tenantry_backend::utils::jwt::SessionTokens;
use tenantry_backend::AppState;

fn init_tracing(sentry_enabled: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .with(if sentry_enabled {
            Some(sentry_tracing::layer())
        } else {
            None
        })
        .init();
}

fn too_many_requests() -> axum::response::Response {
    JsonResponse::too_many_requests("Too many requests. Please wait a moment and try again.")
        .into_response()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    init_tracing(sentry_guard.is_some());

    let config = Config::from_env().context("failed to load configuration")?;
    let session_tokens = SessionTokens::from_env(&config.jwt_issuer, &config.jwt_audience)
        .context("invalid JWT_SECRET")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let user_repo = Arc::new(PostgresUserRepository { pool: pool.clone() });
    let workspace_repo = Arc::new(PostgresWorkspaceRepository { pool: pool.clone() });
    let api_key_repo = Arc::new(PostgresApiKeyRepository { pool: pool.clone() });
    let billing_event_repo = Arc::new(PostgresBillingEventRepository { pool: pool.clone() });
    let session_repo = Arc::new(PostgresSessionRepository { pool: pool.clone() });
    let activity_repo = Arc::new(PostgresActivityRepository { pool });

    let billing_settings = &config.billing;
    let provider: Arc<dyn BillingProvider> = match billing_settings.provider {
        BillingProviderKind::Stripe => Arc::new(StripeBillingProvider::from_settings(
            &billing_settings.stripe,
        )),
        BillingProviderKind::Chargebee => Arc::new(
            ChargebeeBillingProvider::from_settings(
                &billing_settings.chargebee,
                billing_settings.provider_timeout,
                config.insecure_dev_webhooks,
            )
            .context("failed to build Chargebee client")?,
        ),
    };
    if config.insecure_dev_webhooks {
        tracing::warn!("INSECURE_DEV_WEBHOOKS is enabled; unauthenticated webhooks may be accepted");
    }
    let billing = BillingService::new(
        provider,
        workspace_repo.clone(),
        billing_settings.provider_timeout,
    );
    let auth_hooks = SessionAuditHooks::new(
        user_repo.clone(),
        session_repo.clone(),
        activity_repo.clone(),
        config.disable_multiple_sessions,
    );

    let rate_limit = config.rate_limit;
    let global_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit.global_per_millisecond)
            .burst_size(rate_limit.global_burst)
            .use_headers()
            .error_handler(|_err| too_many_requests())
            .finish()
            .context("invalid global rate limiter settings")?,
    );
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(rate_limit.auth_per_second)
            .burst_size(rate_limit.auth_burst)
            .use_headers()
            .error_handler(|_err| too_many_requests())
            .finish()
            .context("invalid auth rate limiter settings")?,
    );
    for limiter in [
        global_governor_conf.limiter().clone(),
        auth_governor_conf.limiter().clone(),
    ] {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limiter.retain_recent();
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let bind_addr = config.bind_addr.clone();
    let webhook_path = config.billing.provider.webhook_path();
    let state = AppState {
        user_repo,
        workspace_repo,
        api_key_repo,
        billing_event_repo,
        session_repo,
        activity_repo,
        billing: Arc::new(billing),
        auth_hooks: Arc::new(auth_hooks),
        config: Arc::new(config),
        session_tokens: Arc::new(session_tokens),
    };

    let app = Router::new()
        .nest(
            "/api/auth",
            routes::auth_routes().layer(GovernorLayer {
                config: auth_governor_conf,
            }),
        )
        .merge(routes::api_routes(webhook_path))
        .layer(GovernorLayer {
            config: global_governor_conf,
        })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%bind_addr, webhook_path, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
