use actix_web::{middleware, web, App, HttpServer};
use realtime_service::{
    auth::CredentialValidator,
    config::Config,
    db,
    handlers::{
        notifications::register_routes as register_notifications,
        websocket::register_routes as register_websocket,
    },
    logging, metrics,
    services::{
        BrowserPushSender, InMemoryNotificationStore, NotificationFanout, NotificationStore,
        PgNotificationStore,
    },
    state::AppState,
    websocket::{ConnectionRegistry, RoomRouter},
};
use std::io;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    logging::init_tracing();

    let config = Arc::new(
        Config::from_env()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?,
    );

    tracing::info!("Starting realtime service");

    let store: Arc<dyn NotificationStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            tracing::info!("Successfully connected to database");
            Arc::new(PgNotificationStore::new(pool))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, notifications are held in memory and will not survive a restart"
            );
            Arc::new(InMemoryNotificationStore::new())
        }
    };

    let registry = ConnectionRegistry::new();
    let rooms = RoomRouter::new(registry.clone());
    let fanout = Arc::new(NotificationFanout::new(
        store.clone(),
        registry.clone(),
        BrowserPushSender::from_config(&config),
    ));

    let state = AppState {
        config: config.clone(),
        validator: CredentialValidator::new(&config.jwt_secret, config.jwt_leeway_seconds),
        registry,
        rooms,
        store,
        fanout,
    };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting HTTP server on {}", addr);

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(|cfg| {
                register_notifications(cfg);
                register_websocket(cfg);
            })
    })
    .bind(&addr)?
    .run()
    .await
}
