//! rotulador - collaborative image annotation server
//!
//! Serves a multi-user web interface that walks annotators through a
//! pipeline of labeling tasks defined in a YAML project file, recording
//! every answer in SQLite. Also hosts the command line tools used to set
//! up projects and ingest image folders.

use axum::Router;
use rotulador_common::db::{AnnotationRepository, ImageRepository};
use rotulador_common::ProjectConfig;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cli;
pub mod error;
pub mod i18n;
pub mod ingest;

pub use crate::error::{ApiError, ApiResult};
use crate::i18n::Translations;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Project file (tasks and users), read once at startup
    pub config: Arc<ProjectConfig>,
    /// Flat folder holding the image files
    pub images_dir: PathBuf,
    pub translations: Arc<Translations>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: ProjectConfig,
        images_dir: PathBuf,
        translations: Translations,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            images_dir,
            translations: Arc::new(translations),
        }
    }

    pub fn images(&self) -> ImageRepository {
        ImageRepository::new(self.db.clone())
    }

    pub fn annotations(&self) -> AnnotationRepository {
        AnnotationRepository::new(self.db.clone())
    }
}

/// Build application router
///
/// Everything except `/health` and `/static/*` requires HTTP basic auth.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    // Protected routes (require authentication)
    let protected = api::page_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        api::auth_middleware,
    ));

    // Public routes (no authentication)
    let public = Router::new()
        .merge(api::static_routes())
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
