use lodge_api::{app, AppState, AuthConfig};
use lodge_booking::{BookingService, CoordinatorConfig, HoldReaper};
use lodge_store::app_config::Config;
use lodge_store::{DbClient, PgReservationStore, PgRoomCatalog, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lodge_api=debug,lodge_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Lodge API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let rules = match db.fetch_booking_rules(config.booking.clone()).await {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!(error = %e, "could not read booking_rules, using file config");
            config.booking.clone()
        }
    };
    tracing::info!(
        hold_seconds = rules.hold_seconds,
        operation_timeout_ms = rules.operation_timeout_ms,
        verify_catalog_prices = rules.verify_catalog_prices,
        "booking rules loaded"
    );

    let store = Arc::new(PgReservationStore::new(db.pool.clone()));
    let mut service = BookingService::new(
        Arc::clone(&store),
        CoordinatorConfig {
            hold_window: rules.hold_window(),
            operation_timeout: rules.operation_timeout(),
            verify_catalog_prices: rules.verify_catalog_prices,
        },
    );
    if rules.verify_catalog_prices {
        service = service.with_catalog(Arc::new(PgRoomCatalog::new(db.pool.clone())));
    }

    let shutdown = CancellationToken::new();

    if config.reaper.enabled {
        let reaper = HoldReaper::new(
            Arc::clone(&store),
            service.lifecycle(),
            Duration::from_secs(config.reaper.interval_seconds),
            config.reaper.batch_size,
        );
        tokio::spawn(reaper.run(shutdown.clone()));
    }

    // Redis is optional; without it requests are not rate limited
    let (redis, rate_limit_per_minute) = match &config.redis {
        Some(redis_config) => match RedisClient::new(&redis_config.url).await {
            Ok(client) => (Some(Arc::new(client)), redis_config.rate_limit_per_minute),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, rate limiting disabled");
                (None, redis_config.rate_limit_per_minute)
            }
        },
        None => (None, 0),
    };

    let app_state = AppState {
        engine: Arc::new(service),
        redis,
        rate_limit_per_minute,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        shutdown: shutdown.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .expect("Server error");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cancelling in-flight work");
    shutdown.cancel();
}
