pub mod cost;
pub mod engine;
pub mod parse;
pub mod pipeline;
pub mod prompt;

pub use engine::{
    Completion, CompletionRequest, GatewayError, LlmGateway, ModelGateway, TokenUsage,
};
pub use pipeline::{CheckError, CheckOptions, Checker, PromptRequest, PromptResponse};
