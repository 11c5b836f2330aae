use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use regcheck_check::{PromptRequest, PromptResponse};
use regcheck_core::{CostReport, Rule, RuleKind, SourceFile, ViolationReport};

use crate::{ApiError, AppState};

// --- Health ---

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "regulations": state.regulations.len(),
        "code_rules": state.code_rules.len(),
    }))
}

// --- Registry routes ---

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteRegulationParams {
    regulation_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteCodeRuleParams {
    code_rule_id: String,
}

fn rule_batch(body: Result<Json<Vec<Rule>>, JsonRejection>) -> Result<Vec<Rule>, ApiError> {
    body.map(|Json(rules)| rules)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn add_rules(state: &AppState, kind: RuleKind, batch: Vec<Rule>) -> Result<Json<serde_json::Value>, ApiError> {
    let registry = state.registry(kind);
    let added = registry.add(batch)?;
    Ok(Json(json!({ "added": added, "total": registry.len() })))
}

fn set_rules(state: &AppState, kind: RuleKind, batch: Vec<Rule>) -> Result<Json<serde_json::Value>, ApiError> {
    let total = state.registry(kind).replace(batch)?;
    Ok(Json(json!({ "total": total })))
}

pub(crate) async fn add_regulations_handler(
    State(state): State<AppState>,
    body: Result<Json<Vec<Rule>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    add_rules(&state, RuleKind::Regulation, rule_batch(body)?)
}

pub(crate) async fn get_regulations_handler(State(state): State<AppState>) -> Json<Vec<Rule>> {
    Json(state.regulations.list())
}

pub(crate) async fn delete_regulation_handler(
    State(state): State<AppState>,
    params: Result<Query<DeleteRegulationParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let deleted = state.regulations.delete(&params.regulation_id);
    Ok(Json(json!({ "deleted": deleted })))
}

pub(crate) async fn set_regulations_handler(
    State(state): State<AppState>,
    body: Result<Json<Vec<Rule>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    set_rules(&state, RuleKind::Regulation, rule_batch(body)?)
}

pub(crate) async fn add_code_rules_handler(
    State(state): State<AppState>,
    body: Result<Json<Vec<Rule>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    add_rules(&state, RuleKind::CodeRule, rule_batch(body)?)
}

pub(crate) async fn get_code_rules_handler(State(state): State<AppState>) -> Json<Vec<Rule>> {
    Json(state.code_rules.list())
}

pub(crate) async fn delete_code_rule_handler(
    State(state): State<AppState>,
    params: Result<Query<DeleteCodeRuleParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let deleted = state.code_rules.delete(&params.code_rule_id);
    Ok(Json(json!({ "deleted": deleted })))
}

pub(crate) async fn set_code_rules_handler(
    State(state): State<AppState>,
    body: Result<Json<Vec<Rule>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    set_rules(&state, RuleKind::CodeRule, rule_batch(body)?)
}

// --- Uploads ---

#[derive(Default)]
struct Upload {
    file: Option<(String, Vec<u8>)>,
    regulations: Option<String>,
}

impl Upload {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = Upload::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("file") => {
                    let filename = field.file_name().unwrap_or("upload").to_string();
                    let bytes = field.bytes().await?;
                    upload.file = Some((filename, bytes.to_vec()));
                }
                Some("regulations") => {
                    upload.regulations = Some(field.text().await?);
                }
                _ => {}
            }
        }
        Ok(upload)
    }

    fn source_file(&mut self) -> Result<SourceFile, ApiError> {
        let (filename, bytes) = self
            .file
            .take()
            .ok_or_else(|| ApiError::BadRequest("missing multipart field 'file'".to_string()))?;
        Ok(SourceFile::from_bytes(filename, bytes)?)
    }

    fn inline_rules(&mut self) -> Result<Vec<Rule>, ApiError> {
        let raw = self.regulations.take().ok_or_else(|| {
            ApiError::BadRequest("missing multipart field 'regulations'".to_string())
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| ApiError::BadRequest(format!("invalid regulations JSON: {e}")))
    }
}

// --- Checks ---

pub(crate) async fn check_violations_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ViolationReport>, ApiError> {
    let file = Upload::read(multipart?).await?.source_file()?;

    let mut rules = state.regulations.list();
    rules.extend(state.code_rules.list());
    if rules.is_empty() {
        return Err(ApiError::BadRequest(
            "no regulations or code rules configured".to_string(),
        ));
    }
    info!(filename = %file.filename, rules = rules.len(), "check-violations");

    Ok(Json(state.checker.check_violations(&file, rules).await?))
}

pub(crate) async fn check_regulations_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ViolationReport>, ApiError> {
    let mut upload = Upload::read(multipart?).await?;
    let rules = upload.inline_rules()?;
    let file = upload.source_file()?;
    info!(filename = %file.filename, rules = rules.len(), "check-regulations");

    Ok(Json(state.checker.check_violations(&file, rules).await?))
}

pub(crate) async fn check_cost_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CostReport>, ApiError> {
    let file = Upload::read(multipart?).await?.source_file()?;
    info!(filename = %file.filename, "check-cost");

    Ok(Json(state.checker.estimate_cost(&file).await?))
}

// --- Passthrough ---

pub(crate) async fn prompt_handler(
    State(state): State<AppState>,
    body: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<PromptResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.checker.passthrough(req).await?))
}
