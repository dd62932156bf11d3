//! Router, shared state and server lifecycle.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::access::Role;
use crate::analysis::{DisabledAnalyzer, DocumentAnalyzer, LlmAnalyzer};
use crate::comment::CommentService;
use crate::config::Config;
use crate::document::{DocumentClassifier, DocumentService};
use crate::lifecycle::{Clock, LifecycleEngine, SystemClock};
use crate::llm::OpenAiCompatClient;
use crate::notify::{LogNotifier, Notifier};
use crate::store::{MemoryStore, Store};
use crate::task::{TaskService, User};

use super::{comments, documents, reminders, tasks};

/// Upload size cap for document bodies.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tasks: TaskService,
    pub documents: DocumentService,
    pub comments: CommentService,
    pub engine: Arc<LifecycleEngine>,
}

impl AppState {
    /// Wire the services around one store, notifier, analyzer and clock.
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        analyzer: Arc<dyn DocumentAnalyzer>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let classifier = Arc::new(DocumentClassifier::new()?);
        let schedule = config.schedule.clone();
        Ok(Self {
            tasks: TaskService::new(
                Arc::clone(&store),
                Arc::clone(&notifier),
                Arc::clone(&clock),
                Arc::clone(&classifier),
                schedule.notify_timeout,
                schedule.reminder_concurrency,
            ),
            documents: DocumentService::new(
                Arc::clone(&store),
                analyzer,
                classifier,
                Arc::clone(&clock),
                config.upload_dir.clone(),
                config.analyzer_timeout,
            ),
            comments: CommentService::new(Arc::clone(&store), Arc::clone(&clock)),
            engine: Arc::new(LifecycleEngine::new(
                Arc::clone(&store),
                notifier,
                clock,
                schedule,
            )),
            store,
        })
    }
}

fn analyzer_for(config: &Config, clock: Arc<dyn Clock>) -> Arc<dyn DocumentAnalyzer> {
    match &config.llm.api_key {
        Some(key) => {
            tracing::info!(
                "Document analysis enabled ({} via {})",
                config.llm.model,
                config.llm.base_url
            );
            let client = Arc::new(OpenAiCompatClient::new(key.clone(), &config.llm.base_url));
            Arc::new(LlmAnalyzer::new(client, config.llm.model.clone(), clock))
        }
        None => {
            tracing::warn!("LLM_API_KEY not set, uploads get fallback analysis records");
            Arc::new(DisabledAnalyzer)
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Build the `/api` router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/tasks/import", post(tasks::import_tasks))
        .route("/tasks/:id", get(tasks::task_details).patch(tasks::update_task))
        .route("/tasks/:id/history", get(tasks::task_history))
        .route("/tasks/:id/assessment", get(tasks::task_assessment))
        .route("/tasks/:id/sections", get(tasks::task_sections))
        .route(
            "/tasks/:id/documents",
            get(documents::list_documents)
                .post(documents::upload_document)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/tasks/:id/reminders", post(reminders::send_reminder))
        .route("/documents/:id/analysis", get(documents::document_analysis))
        .route("/documents/:id/reanalyze", post(documents::reanalyze_document))
        .route("/documents/:id/status", patch(documents::update_status))
        .route("/reminders/pending", get(reminders::pending))
        .route("/reminders/sweep", post(reminders::reminder_sweep))
        .route("/reminders/overdue-sweep", post(reminders::overdue_sweep))
        .route("/lifecycle/promote", post(reminders::promotion_sweep))
        .route("/comments", get(comments::list_comments).post(comments::create_comment))
        .route("/comments/:id/replies", post(comments::reply_to_comment))
        .route("/comments/:id/like", post(comments::like_comment))
        .route("/clients", get(tasks::list_clients).post(tasks::create_client))
        .route("/users", post(tasks::create_user))
        .route("/users/me", get(tasks::current_user));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and the lifecycle engine.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::load(config.store_path()).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::new(
        &config,
        store,
        Arc::new(LogNotifier),
        analyzer_for(&config, Arc::clone(&clock)),
        clock,
    )?);

    if let Some(email) = &config.admin_email {
        ensure_admin(state.store.as_ref(), email).await?;
    }

    state.engine.start().await;

    let app = router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("Server listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.engine.stop().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Create the bootstrap superadmin unless the email is already registered.
async fn ensure_admin(store: &dyn Store, email: &str) -> anyhow::Result<()> {
    if store.find_user_by_name_or_email(email).await?.is_some() {
        return Ok(());
    }
    let name = email.split('@').next().unwrap_or(email).to_string();
    let user = store
        .insert_user(User::new(name, email.to_string(), Role::SuperAdmin))
        .await?;
    tracing::info!("Created superadmin {} ({})", user.email, user.id);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping lifecycle engine...");
}
