//! LLM 层：客户端抽象与实现（Groq / OpenAI 兼容 / Mock）

pub mod groq;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use groq::{create_groq_client, GROQ_BASE_URL, GROQ_LLAMA3_8B};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, SamplingParams, TokenUsage};
pub use traits::LlmClient;

use crate::config::LlmSection;

/// 根据配置与环境变量选择 LLM 后端；缺少对应 API Key 时返回错误
pub fn create_llm_from_config(cfg: &LlmSection) -> anyhow::Result<Arc<dyn LlmClient>> {
    let params = SamplingParams {
        temperature: cfg.temperature,
        max_tokens: cfg.max_tokens,
    };
    match cfg.provider.to_lowercase().as_str() {
        "groq" => {
            let client = match cfg.base_url.as_deref() {
                None => create_groq_client(Some(&cfg.model), params),
                Some(base) => std::env::var("GROQ_API_KEY")
                    .ok()
                    .map(|key| OpenAiClient::new(Some(base), &cfg.model, &key).with_params(params)),
            }
            .ok_or_else(|| anyhow::anyhow!("GROQ_API_KEY is not set"))?;
            tracing::info!("Using Groq LLM ({})", client.model());
            Ok(Arc::new(client))
        }
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.model);
            Ok(Arc::new(
                OpenAiClient::new(cfg.base_url.as_deref(), &cfg.model, &api_key)
                    .with_params(params),
            ))
        }
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}
