//! Groq API 客户端（OpenAI 兼容格式）
//!
//! Groq 提供与 OpenAI 兼容的 API 接口。
//! - Base URL: https://api.groq.com/openai/v1
//! - 默认模型: llama3-8b-8192

use crate::llm::{OpenAiClient, SamplingParams};

/// Groq API 常量
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_LLAMA3_8B: &str = "llama3-8b-8192";

/// 创建 Groq 客户端
///
/// - API Key 来自环境变量 `GROQ_API_KEY`，未设置时返回 None
/// - 模型可通过 `model` 参数或 `GROQ_MODEL` 环境变量指定
pub fn create_groq_client(model: Option<&str>, params: SamplingParams) -> Option<OpenAiClient> {
    let api_key = std::env::var("GROQ_API_KEY").ok()?;

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("GROQ_MODEL").ok())
        .unwrap_or_else(|| GROQ_LLAMA3_8B.to_string());

    Some(OpenAiClient::new(Some(GROQ_BASE_URL), &model, &api_key).with_params(params))
}
