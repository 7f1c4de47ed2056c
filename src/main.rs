//! Classroom Sync Backend
//!
//! Mirrors classrooms, students and assignments onto a GitLab group hierarchy,
//! with SQLite persistence and Tantivy full-text search.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod remote;
mod search;
mod services;
mod sync;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use remote::{GitLabConnector, RemoteConnector};
use search::{SearchEntry, SearchIndex};
use services::SyncService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
    pub service: SyncService,
    pub connector: Arc<dyn RemoteConnector>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Classroom Sync Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Remote service: {}", config.remote.base_url);
    tracing::info!("Consistency policy: {:?}", config.consistency);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (CLASSROOM_API_PSK). Authentication is disabled!");
    }
    if config.remote.default_token.is_none() {
        tracing::info!("No default remote token; requests must send x-remote-token");
    }

    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    tracing::info!("Building search index...");
    let entries = index_entries(&repo).await?;
    search.rebuild(&entries).await?;

    let connector: Arc<dyn RemoteConnector> =
        Arc::new(GitLabConnector::new(config.remote.clone())?);

    let state = AppState {
        service: SyncService::new(repo.clone(), search.clone(), config.consistency),
        repo,
        search,
        config: Arc::new(config.clone()),
        connector,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Search entries for every classroom, assignment and student.
async fn index_entries(repo: &Repository) -> Result<Vec<SearchEntry>, errors::AppError> {
    let classrooms = repo.list_classrooms(None).await?;
    let assignments = repo.list_assignments(None).await?;
    let students = repo.list_students(None).await?;

    Ok(classrooms
        .iter()
        .map(SearchEntry::from)
        .chain(assignments.iter().map(SearchEntry::from))
        .chain(students.iter().map(SearchEntry::from))
        .collect())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Session
        .route("/session", get(api::get_session))
        .route("/revision", get(api::get_revision))
        // Classrooms
        .route(
            "/classrooms",
            get(api::list_classrooms).post(api::create_classroom),
        )
        .route(
            "/classrooms/{id}",
            get(api::get_classroom)
                .put(api::update_classroom)
                .delete(api::delete_classroom),
        )
        .route(
            "/classrooms/{id}/students",
            post(api::add_classroom_student),
        )
        .route(
            "/classrooms/{id}/students/{student_id}",
            delete(api::remove_classroom_student),
        )
        .route(
            "/classrooms/{id}/assignments",
            post(api::create_assignment),
        )
        // Assignments
        .route("/assignments", get(api::list_assignments))
        .route(
            "/assignments/{id}",
            get(api::get_assignment)
                .put(api::update_assignment)
                .delete(api::delete_assignment),
        )
        .route("/assignments/{id}/sync", post(api::sync_assignment))
        .route("/assignments/{id}/forks", post(api::fork_assignment_projects))
        .route(
            "/assignments/{id}/submissions",
            get(api::list_submissions).post(api::create_submission),
        )
        .route("/submissions/{id}", put(api::grade_submission))
        // Students
        .route(
            "/students",
            get(api::list_students).post(api::create_student),
        )
        .route(
            "/students/{id}",
            get(api::get_student)
                .put(api::update_student)
                .delete(api::delete_student),
        )
        .route("/students/{id}/resolve", post(api::resolve_student))
        // Search
        .route("/search", get(api::search))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
