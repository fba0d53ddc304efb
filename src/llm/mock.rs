//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设回复；脚本用完或遇到 None 时返回错误，模拟补全失败。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, TokenUsage};
use crate::memory::Message;

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Option<String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    usage: TokenUsage,
    per_call: (u64, u64),
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Some(text) 作为补全返回，None 表示该次调用失败
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            ..Self::default()
        }
    }

    /// 每次调用计入的 (prompt, completion) token 数
    pub fn with_usage_per_call(mut self, prompt: u64, completion: u64) -> Self {
        self.per_call = (prompt, completion);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的最后一条消息内容
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.usage.add(self.per_call.0, self.per_call.1);
        if let (Ok(mut prompts), Some(last)) = (self.prompts.lock(), messages.last()) {
            prompts.push(last.content.clone());
        }
        let next = self
            .script
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .flatten();
        next.ok_or_else(|| "mock: no scripted reply".to_string())
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
