//! 短期记忆：LLM 消息与账号对话记录
//!
//! Message 是发给补全接口的用户消息；Transcript 记录一次自动对话中的每一句（仅在内存中，账号处理结束即丢弃）。

/// 发给补全接口的单条用户消息
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// 说话方：我方账号（由 LLM 代写）或远端角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    Human,
    Persona,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// 一次自动对话的完整记录
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            speaker,
            text: text.into(),
        });
    }

    /// 我方已发送的消息数
    pub fn human_messages(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.speaker == Speaker::Human)
            .count()
    }

    pub fn into_turns(self) -> Vec<ConversationTurn> {
        self.turns
    }
}
