use std::sync::Arc;

use clap::Parser;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use regcheck_check::{CheckOptions, Checker, LlmGateway, PromptRequest};
use regcheck_core::{GatewaySettings, PriceTable, Rule, RuleKind, RuleRegistry, SourceFile};

// --- Configuration ---

#[derive(Debug, Clone, Parser)]
#[command(name = "regcheck-mcp", version, about = "MCP server for regcheck rules and checks")]
struct Config {
    /// Model provider: openai, anthropic, google, ollama, groq, mistral, deepseek
    #[arg(long, env = "REGCHECK_PROVIDER", default_value = "openai")]
    provider: String,

    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "REGCHECK_MODEL", default_value = "gpt-4o")]
    model: String,

    #[arg(long, env = "REGCHECK_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    #[arg(long, env = "REGCHECK_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: u32,

    #[arg(long, env = "REGCHECK_MAX_CONCURRENT_CALLS", default_value_t = 4)]
    max_concurrent_calls: usize,

    /// JSON price table overriding the built-in rates; must contain a "default" row
    #[arg(long, env = "REGCHECK_PRICE_TABLE")]
    price_table: Option<std::path::PathBuf>,
}

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct KindRequest {
    /// Which registry: "regulation" or "code_rule"
    kind: RuleKind,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RulesRequest {
    /// Which registry: "regulation" or "code_rule"
    kind: RuleKind,
    /// Rules to store, each {"id": "GDPR-5", "description": "..."}
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteRuleRequest {
    /// Which registry: "regulation" or "code_rule"
    kind: RuleKind,
    /// ID of the rule to delete. Unknown IDs are ignored.
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CheckViolationsRequest {
    /// File name, used only for reporting
    filename: String,
    /// Full text of the source file
    content: String,
    /// Rules to check against. Omit to use every stored regulation and code rule.
    rules: Option<Vec<Rule>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EstimateCostRequest {
    /// File name, used only for reporting
    filename: String,
    /// Full text of the source file
    content: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PromptToolRequest {
    /// Prompt text sent as a single user message
    prompt: String,
    /// Model name. Default: gpt-3.5-turbo
    model: Option<String>,
    /// Sampling temperature. Default: 0.7
    temperature: Option<f32>,
    /// Maximum output tokens. Default: 1000
    max_tokens: Option<u32>,
}

// --- Server ---

#[derive(Clone)]
pub struct RegcheckServer {
    regulations: Arc<RuleRegistry>,
    code_rules: Arc<RuleRegistry>,
    checker: Arc<Checker>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RegcheckServer {
    pub fn new(checker: Checker) -> Self {
        Self {
            regulations: Arc::new(RuleRegistry::new(RuleKind::Regulation)),
            code_rules: Arc::new(RuleRegistry::new(RuleKind::CodeRule)),
            checker: Arc::new(checker),
            tool_router: Self::tool_router(),
        }
    }

    fn registry(&self, kind: RuleKind) -> &RuleRegistry {
        match kind {
            RuleKind::Regulation => &self.regulations,
            RuleKind::CodeRule => &self.code_rules,
        }
    }

    #[tool(description = "List the stored regulations or code rules, in insertion order")]
    fn list_rules(
        &self,
        Parameters(req): Parameters<KindRequest>,
    ) -> Result<CallToolResult, McpError> {
        let rules = self.registry(req.kind).list();
        if rules.is_empty() {
            return Ok(text_result(format!(
                "No {}s defined. Use add_rules to create some.",
                req.kind.label()
            )));
        }
        Ok(json_result(&rules))
    }

    #[tool(
        description = "Add rules to a registry. The whole batch is rejected if any ID already exists or repeats within the batch."
    )]
    fn add_rules(
        &self,
        Parameters(req): Parameters<RulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.registry(req.kind).add(req.rules) {
            Ok(added) => Ok(text_result(format!(
                "Added {} {}(s): {}",
                added.len(),
                req.kind.label(),
                added.join(", ")
            ))),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Replace the entire contents of a registry. Repeated IDs in the batch keep the last description."
    )]
    fn set_rules(
        &self,
        Parameters(req): Parameters<RulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.registry(req.kind).replace(req.rules) {
            Ok(total) => Ok(text_result(format!(
                "{} registry now holds {} rule(s)",
                req.kind.label(),
                total
            ))),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "Delete a rule by ID. Deleting an unknown ID succeeds without changes.")]
    fn delete_rule(
        &self,
        Parameters(req): Parameters<DeleteRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let id = self.registry(req.kind).delete(&req.id);
        Ok(text_result(format!("Deleted {} '{}'", req.kind.label(), id)))
    }

    #[tool(
        description = "Check a source file for rule violations. Issues one model call per rule. Returns {filename, total_lines, total_violations, violations: [{start_line, end_line, rule_id, description, severity}]}. A rule whose model output cannot be parsed yields one medium-severity record covering the whole file."
    )]
    async fn check_violations(
        &self,
        Parameters(req): Parameters<CheckViolationsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let rules = match req.rules {
            Some(rules) => rules,
            None => {
                let mut rules = self.regulations.list();
                rules.extend(self.code_rules.list());
                rules
            }
        };
        let file = SourceFile::new(req.filename, req.content);

        match self.checker.check_violations(&file, rules).await {
            Ok(report) => Ok(json_result(&report)),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Estimate the API cost of the LLM calls a source file makes. Returns {filename, total_lines, total_calls, total_estimated_cost, llm_calls: [{start_line, end_line, model, estimated_input_tokens, estimated_output_tokens, call_type, description, estimated_cost}]}. Costs are USD, rounded to 6 decimals."
    )]
    async fn estimate_cost(
        &self,
        Parameters(req): Parameters<EstimateCostRequest>,
    ) -> Result<CallToolResult, McpError> {
        let file = SourceFile::new(req.filename, req.content);
        match self.checker.estimate_cost(&file).await {
            Ok(report) => Ok(json_result(&report)),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "Send a single prompt to the configured model provider and return its reply")]
    async fn prompt(
        &self,
        Parameters(req): Parameters<PromptToolRequest>,
    ) -> Result<CallToolResult, McpError> {
        let request = PromptRequest {
            prompt: req.prompt,
            model: req.model.unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            temperature: req.temperature.unwrap_or(0.7),
            max_tokens: req.max_tokens.unwrap_or(1000),
        };
        match self.checker.passthrough(request).await {
            Ok(resp) => Ok(json_result(&resp)),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

const INSTRUCTIONS: &str = r#"regcheck keeps two in-memory registries, regulations and code rules, and asks a language model to check source files against them.

- Use `add_rules` / `set_rules` / `delete_rule` / `list_rules` to manage the registries. Nothing is persisted across restarts.
- `check_violations` sends the file once per rule. Pass `rules` to check against an ad-hoc set instead of the stored ones.
- `estimate_cost` asks the model to find LLM API calls in the file and prices them per 1000 tokens.
- Findings come from the model and may be wrong. Treat them as review hints."#;

#[tool_handler]
impl ServerHandler for RegcheckServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

fn json_result<T: Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_string_pretty(value) {
        Ok(json) => text_result(json),
        Err(e) => CallToolResult::error(vec![Content::text(format!("Serialization error: {e}"))]),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::parse();
    let settings = GatewaySettings {
        provider: config.provider.clone(),
        api_key: config.api_key.clone(),
        model: config.model.clone(),
    };
    if !settings.is_configured() {
        warn!(provider = %settings.provider, "model provider is not fully configured");
    }

    let checker = Checker::new(
        Arc::new(LlmGateway::new(settings)?),
        CheckOptions {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_concurrent_calls: config.max_concurrent_calls.max(1),
        },
        PriceTable::load(config.price_table.as_deref())?,
    );

    info!(provider = %config.provider, model = %config.model, "regcheck-mcp starting on stdio");
    let service = RegcheckServer::new(checker)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
