#![forbid(unsafe_code)]

pub mod config;
pub mod error;
mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;

use regcheck_check::Checker;
use regcheck_core::{RuleKind, RuleRegistry};

pub use config::Config;
pub use error::ApiError;

/// Shared handler state. Registries are owned here and injected into every
/// handler; nothing lives in module-level globals.
#[derive(Clone)]
pub struct AppState {
    pub regulations: Arc<RuleRegistry>,
    pub code_rules: Arc<RuleRegistry>,
    pub checker: Arc<Checker>,
}

impl AppState {
    pub fn new(checker: Checker) -> Self {
        Self {
            regulations: Arc::new(RuleRegistry::new(RuleKind::Regulation)),
            code_rules: Arc::new(RuleRegistry::new(RuleKind::CodeRule)),
            checker: Arc::new(checker),
        }
    }

    pub fn registry(&self, kind: RuleKind) -> &Arc<RuleRegistry> {
        match kind {
            RuleKind::Regulation => &self.regulations,
            RuleKind::CodeRule => &self.code_rules,
        }
    }
}

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz_handler))
        .route("/add-regulations", post(handlers::add_regulations_handler))
        .route("/get-regulations", get(handlers::get_regulations_handler))
        .route("/delete-regulations", delete(handlers::delete_regulation_handler))
        .route("/set-regulations", post(handlers::set_regulations_handler))
        .route("/add-code-rules", post(handlers::add_code_rules_handler))
        .route("/get-code-rules", get(handlers::get_code_rules_handler))
        .route("/delete-code-rules", delete(handlers::delete_code_rule_handler))
        .route("/set-code-rules", post(handlers::set_code_rules_handler))
        .route("/check-violations", post(handlers::check_violations_handler))
        .route("/check-regulations", post(handlers::check_regulations_handler))
        .route("/check-cost", post(handlers::check_cost_handler))
        .route("/mcp", post(handlers::prompt_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
