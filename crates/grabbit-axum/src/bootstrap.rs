//! Server bootstrap - the composition root.
//!
//! The only place where infrastructure is wired together: database pool,
//! repositories, event broadcaster, worker registry, intakes, auth keys.
//! Everything downstream receives its dependencies explicitly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use grabbit_core::{
    AppConfig, ChatConfig, ChatConnector, JobEventEmitter, JobStore, RoutingStore, SettingsStore,
    UserStore, paths,
};
use grabbit_db::{
    SqliteJobStore, SqliteRoutingStore, SqliteSettingsStore, SqliteUserStore, setup_database,
};
use grabbit_download::{ChatIntake, ChatWorkerConfig, Extractor, UrlIntake, WorkerRegistry, YtDlp};

use crate::auth::AuthKeys;
use crate::broadcast::EventBroadcaster;

/// Application context shared by all handlers.
pub struct AppContext {
    pub store: Arc<dyn JobStore>,
    pub routing: Arc<dyn RoutingStore>,
    pub users: Arc<dyn UserStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub events: Arc<EventBroadcaster>,
    pub registry: Arc<WorkerRegistry>,
    pub url_intake: Arc<UrlIntake>,
    pub chat_intake: Arc<ChatIntake>,
    pub auth: AuthKeys,
    pub config: AppConfig,
}

impl AppContext {
    /// The broadcaster as the core emitter port.
    #[must_use]
    pub fn emitter(&self) -> Arc<dyn JobEventEmitter> {
        Arc::clone(&self.events) as Arc<dyn JobEventEmitter>
    }

    /// Current chat provider config (file + env), re-read on each call so
    /// operator updates are visible without a reload.
    #[must_use]
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig::load(&self.config.provider_config_path)
    }
}

/// Construct the full application context.
///
/// `connector` is the chat session capability; `None` leaves the chat intake
/// quiescent while everything else runs.
pub async fn bootstrap(
    config: AppConfig,
    connector: Option<Arc<dyn ChatConnector>>,
) -> Result<Arc<AppContext>> {
    let db_path = paths::database_path();
    tracing::info!(
        database = %db_path.display(),
        downloads = %config.download_dir.display(),
        "bootstrap paths resolved"
    );

    let pool = setup_database(&db_path).await?;

    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(pool.clone()));
    let routing: Arc<dyn RoutingStore> = Arc::new(SqliteRoutingStore::new(pool.clone()));
    let users: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(pool.clone()));
    let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::new(pool));

    // Default operator account on first run
    let admin_user =
        std::env::var("GRABBIT_ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let admin_password =
        std::env::var("GRABBIT_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    users.seed_default(&admin_user, &admin_password).await?;

    let auth = AuthKeys::new(&resolve_jwt_secret(&settings).await?);

    let events = Arc::new(EventBroadcaster::with_defaults());
    let events_dyn: Arc<dyn JobEventEmitter> = Arc::clone(&events) as Arc<dyn JobEventEmitter>;
    let registry = Arc::new(WorkerRegistry::new());

    let extractor: Arc<dyn Extractor> = match YtDlp::locate() {
        Some(ytdlp) => Arc::new(ytdlp),
        None => {
            tracing::warn!(
                "yt-dlp not found on PATH (set YTDLP_PATH); URL downloads will fail until installed"
            );
            Arc::new(YtDlp::new(PathBuf::from("yt-dlp")))
        }
    };

    let url_intake = Arc::new(UrlIntake::new(
        Arc::clone(&store),
        Arc::clone(&routing),
        Arc::clone(&events_dyn),
        Arc::clone(&registry),
        extractor,
        config.download_dir.clone(),
        paths::cookies_file(),
    ));

    let chat_intake = Arc::new(ChatIntake::new(
        Arc::clone(&store),
        Arc::clone(&routing),
        events_dyn,
        Arc::clone(&registry),
        config.download_dir.clone(),
        ChatWorkerConfig {
            max_retries: config.max_retries,
            ..ChatWorkerConfig::default()
        },
    ));

    let chat_config = ChatConfig::load(&config.provider_config_path);
    chat_intake.start(connector, &chat_config).await;

    Ok(Arc::new(AppContext {
        store,
        routing,
        users,
        settings,
        events,
        registry,
        url_intake,
        chat_intake,
        auth,
        config,
    }))
}

/// JWT secret: env override, else the persisted one, else generate and
/// persist so tokens survive restarts.
async fn resolve_jwt_secret(settings: &Arc<dyn SettingsStore>) -> Result<String> {
    if let Ok(secret) = std::env::var("JWT_SECRET") {
        let secret = secret.trim().to_string();
        if !secret.is_empty() {
            return Ok(secret);
        }
    }

    if let Some(secret) = settings.get("jwt_secret").await? {
        return Ok(secret);
    }

    let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    settings.set("jwt_secret", &secret).await?;
    tracing::info!("generated and persisted a new JWT signing secret");
    Ok(secret)
}

/// Bind and serve until the process is stopped.
pub async fn start_server(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.host, ctx.config.port);
    let app = crate::routes::create_router(Arc::clone(&ctx));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("grabbit control surface listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
