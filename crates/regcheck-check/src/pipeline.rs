use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use regcheck_core::{CostReport, PriceTable, Rule, SourceFile, Violation, ViolationReport};

use crate::engine::{CompletionRequest, GatewayError, ModelGateway, TokenUsage};
use crate::{cost, parse, prompt};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("no rules to check against; add regulations or code rules first")]
    EmptyRuleSet,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("cost analysis output could not be parsed: {0}")]
    MalformedCost(#[from] parse::MalformedOutput),
    #[error("rule check task failed: {0}")]
    Task(String),
}

impl CheckError {
    /// Whether the caller sent something unusable, as opposed to an upstream
    /// or internal failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, CheckError::EmptyRuleSet)
    }
}

/// Sampling knobs for the two built-in checks.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on simultaneous gateway calls within one request.
    pub max_concurrent_calls: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            max_concurrent_calls: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    #[serde(default = "default_prompt_model")]
    pub model: String,
    #[serde(default = "default_prompt_temperature")]
    pub temperature: f32,
    #[serde(default = "default_prompt_max_tokens")]
    pub max_tokens: u32,
}

fn default_prompt_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_prompt_temperature() -> f32 {
    0.7
}

fn default_prompt_max_tokens() -> u32 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub response: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Runs rule checks and cost estimates against a [`ModelGateway`].
pub struct Checker {
    gateway: Arc<dyn ModelGateway>,
    options: CheckOptions,
    prices: PriceTable,
}

impl Checker {
    pub fn new(gateway: Arc<dyn ModelGateway>, options: CheckOptions, prices: PriceTable) -> Self {
        Self {
            gateway,
            options,
            prices,
        }
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Check `file` against every rule. One gateway call per rule, at most
    /// `max_concurrent_calls` in flight; results come back in rule order.
    pub async fn check_violations(
        &self,
        file: &SourceFile,
        rules: Vec<Rule>,
    ) -> Result<ViolationReport, CheckError> {
        if rules.is_empty() {
            return Err(CheckError::EmptyRuleSet);
        }

        info!(
            filename = %file.filename,
            total_lines = file.total_lines,
            rules = rules.len(),
            "checking violations"
        );

        let limit = Arc::new(Semaphore::new(self.options.max_concurrent_calls.max(1)));
        let system = prompt::violation_system_prompt();
        let mut tasks = JoinSet::new();

        for (index, rule) in rules.into_iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let limit = Arc::clone(&limit);
            let request = CompletionRequest {
                model: self.options.model.clone(),
                system: Some(system.clone()),
                prompt: prompt::violation_prompt(&rule.description, &file.text),
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
            };
            let total_lines = file.total_lines;

            tasks.spawn(async move {
                let _permit = limit
                    .acquire_owned()
                    .await
                    .map_err(|e| CheckError::Task(e.to_string()))?;
                let completion = gateway.complete(&request).await?;
                debug!(rule_id = %rule.id, raw = %completion.text, "model output");

                let findings = match parse::parse_violations(&completion.text) {
                    Ok(findings) => findings,
                    Err(e) => {
                        warn!(rule_id = %rule.id, error = %e, "falling back to whole-file review");
                        vec![parse::fallback_finding(total_lines)]
                    }
                };

                let violations: Vec<Violation> = findings
                    .into_iter()
                    .map(|f| Violation {
                        start_line: f.start_line,
                        end_line: f.end_line,
                        rule_id: rule.id.clone(),
                        description: f.description,
                        severity: f.severity,
                    })
                    .collect();
                Ok::<_, CheckError>((index, violations))
            });
        }

        let mut per_rule: Vec<(usize, Vec<Violation>)> = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(result)) => per_rule.push(result),
                Ok(Err(e)) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(CheckError::Task(e.to_string()));
                }
            }
        }
        per_rule.sort_by_key(|(index, _)| *index);

        let violations: Vec<Violation> = per_rule.into_iter().flat_map(|(_, v)| v).collect();
        info!(filename = %file.filename, found = violations.len(), "violation check done");

        Ok(ViolationReport {
            filename: file.filename.clone(),
            total_lines: file.total_lines,
            total_violations: violations.len(),
            violations,
        })
    }

    /// Ask the model to list the file's own model-invocation sites, then
    /// price each one.
    pub async fn estimate_cost(&self, file: &SourceFile) -> Result<CostReport, CheckError> {
        info!(filename = %file.filename, total_lines = file.total_lines, "estimating cost");

        let request = CompletionRequest {
            model: self.options.model.clone(),
            system: Some(prompt::cost_system_prompt()),
            prompt: prompt::cost_prompt(&file.text),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };
        let completion = self.gateway.complete(&request).await?;
        debug!(raw = %completion.text, "model output");

        let calls = parse::parse_cost_calls(&completion.text)?;
        let (llm_calls, total_estimated_cost) = cost::price_calls(&self.prices, calls);
        info!(
            filename = %file.filename,
            calls = llm_calls.len(),
            total_estimated_cost,
            "cost estimate done"
        );

        Ok(CostReport {
            filename: file.filename.clone(),
            total_lines: file.total_lines,
            total_calls: llm_calls.len(),
            total_estimated_cost,
            llm_calls,
        })
    }

    /// Forward a caller-supplied prompt unchanged.
    pub async fn passthrough(&self, req: PromptRequest) -> Result<PromptResponse, CheckError> {
        info!(model = %req.model, "prompt passthrough");
        let request = CompletionRequest {
            model: req.model.clone(),
            system: None,
            prompt: req.prompt,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };
        let completion = self.gateway.complete(&request).await?;
        Ok(PromptResponse {
            response: completion.text,
            model: req.model,
            usage: completion.usage,
        })
    }
}
