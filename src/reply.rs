//! 回复生成：根据角色上下文与角色刚说的话，让 LLM 代写我方的下一句
//!
//! 任何补全失败或空回复都返回 None，调用方据此结束对话，不做重试。

use std::sync::Arc;

use thiserror::Error;

use crate::llm::LlmClient;
use crate::memory::Message;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Completion failed: {0}")]
    Completion(String),

    #[error("Completion returned no text")]
    Empty,
}

/// 默认提示模板；{context} 与 {utterance} 会被替换
pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are having a conversation with an AI character.
The character's context is: {context}
The AI just said: \"{utterance}\"
Generate a natural and engaging response that continues the conversation.
Keep the response concise but contextual.";

pub struct ReplyGenerator {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// 单次扫描模板替换占位符；替换进来的文本不会再被当作模板解析
    pub fn build_prompt(&self, persona_utterance: &str, persona_context: &str) -> String {
        let mut out = String::with_capacity(
            self.template.len() + persona_utterance.len() + persona_context.len(),
        );
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(persona_context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{utterance}") {
                out.push_str(persona_utterance);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    pub async fn try_generate(
        &self,
        persona_utterance: &str,
        persona_context: &str,
    ) -> Result<String, GenerationError> {
        let messages = vec![Message::user(
            self.build_prompt(persona_utterance, persona_context),
        )];
        let text = self
            .llm
            .complete(&messages)
            .await
            .map_err(GenerationError::Completion)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text.to_string())
    }

    /// 生成下一句；失败时记录日志并返回 None
    pub async fn generate_reply(
        &self,
        persona_utterance: &str,
        persona_context: &str,
    ) -> Option<String> {
        match self.try_generate(persona_utterance, persona_context).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!("Reply generation error: {}", e);
                None
            }
        }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}
