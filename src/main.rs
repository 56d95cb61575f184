use anyhow::Result;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wildwatch::alerting::{AlertDispatcher, ZoneTable};
use wildwatch::api::{AppState, RestApi};
use wildwatch::config::{self, Config};
use wildwatch::db::repositories::{UserStore, UsersRepository};
use wildwatch::db::DatabaseService;
use wildwatch::detection::DetectionOrchestrator;
use wildwatch::events::EventStore;
use wildwatch::messaging::{EventBus, EventMessage, EventType};
use wildwatch::notify::{EmailSender, HttpMailer, SmsSender, TwilioSms};
use wildwatch::security::AuthService;
use wildwatch::services::SubmissionPipeline;

/// Config path from the first argument, else `WILDWATCH_CONFIG`
fn config_path() -> Option<PathBuf> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WILDWATCH_CONFIG").ok())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
}

async fn run_app(config: Config) -> Result<()> {
    info!("Starting WildWatch monitoring service");

    let event_bus = Arc::new(EventBus::default());

    let database = DatabaseService::new(&config.database).await?;
    let users: Arc<dyn UserStore> = Arc::new(UsersRepository::new(database.pool.clone()));

    let email: Arc<dyn EmailSender> = Arc::new(HttpMailer::from_config(&config.notification)?);
    let sms: Arc<dyn SmsSender> = Arc::new(TwilioSms::from_config(&config.notification)?);
    if config.notification.sender_email.is_empty() {
        warn!("No sender email configured; alert emails will carry no audit copy");
    }

    let zones = Arc::new(ZoneTable::from_config(&config.zones));
    info!("Loaded {} monitoring zones", zones.len());

    let orchestrator = Arc::new(DetectionOrchestrator::from_config(
        &config.detection,
        event_bus.clone(),
    )?);
    let events = Arc::new(EventStore::new(&config.event_log.path));
    match events.read_all().await {
        Ok(records) => info!("Event log {:?} holds {} records", events.path(), records.len()),
        Err(e) => warn!("Event log {:?} is unreadable: {:#}", events.path(), e),
    }
    let alerts = Arc::new(AlertDispatcher::new(
        zones,
        users.clone(),
        email.clone(),
        sms.clone(),
        config.notification.sender_email.clone(),
        event_bus.clone(),
    ));
    let pipeline = Arc::new(SubmissionPipeline::new(
        orchestrator,
        events,
        alerts,
        event_bus.clone(),
    ));
    let auth_service = Arc::new(AuthService::new(
        users,
        email,
        sms,
        config.notification.sender_email.clone(),
        &config.security,
    ));

    let delivery_failures = Arc::new(AtomicU64::new(0));
    let failures = delivery_failures.clone();
    let subscription = event_bus
        .subscribe(
            EventType::NotificationFailed,
            Arc::new(move |_: EventMessage| -> Result<()> {
                failures.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
        )
        .await?;

    event_bus
        .emit(
            EventType::SystemStartup,
            None,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }),
        )
        .await;

    let api = RestApi::new(
        &config.api,
        AppState {
            pipeline,
            auth_service,
        },
    );
    let served = api.run(shutdown_signal()).await;

    event_bus
        .emit(
            EventType::SystemShutdown,
            None,
            serde_json::json!({"reason": "Normal shutdown"}),
        )
        .await;

    if let Err(e) = event_bus.unsubscribe(&subscription).await {
        warn!("Failed to stop notification failure counter: {:#}", e);
    }
    let failed = delivery_failures.load(Ordering::Relaxed);
    if failed > 0 {
        warn!("{} alert notifications failed during this run", failed);
    }

    database.pool.close().await;

    served
}

#[tokio::main]
async fn main() {
    let path = config_path();
    let mut config = match config::load_config(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    config.apply_env_overrides();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();

    if let Some(path) = &path {
        info!("Configuration loaded from {:?}", path);
    }

    if let Err(e) = run_app(config).await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
