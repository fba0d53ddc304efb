//! 角色选择：启动时从角色列表中挑一个，供本次运行的所有账号共用
//!
//! ConsoleSelector 在终端里列出角色并读取序号或 slug；FixedSelector 直接使用配置 / 命令行给定的 slug。

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::service::Persona;

/// 从角色列表中选出一个 slug；None 表示放弃选择
#[async_trait]
pub trait PersonaSelector: Send + Sync {
    async fn select(&self, personas: &[Persona]) -> Option<String>;
}

/// 固定 slug，不做交互
#[derive(Debug, Clone)]
pub struct FixedSelector {
    slug: String,
}

impl FixedSelector {
    pub fn new(slug: impl Into<String>) -> Self {
        Self { slug: slug.into() }
    }
}

#[async_trait]
impl PersonaSelector for FixedSelector {
    async fn select(&self, personas: &[Persona]) -> Option<String> {
        if !personas.iter().any(|p| p.slug == self.slug) {
            // 列表只取了第一页，不在其中也交给详情接口去验证
            tracing::debug!(slug = %self.slug, "preset persona not in listed page");
        }
        Some(self.slug.clone())
    }
}

/// 终端交互选择
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSelector;

impl ConsoleSelector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PersonaSelector for ConsoleSelector {
    async fn select(&self, personas: &[Persona]) -> Option<String> {
        if personas.is_empty() {
            return None;
        }

        let mut stdout = tokio::io::stdout();
        let menu = render_menu(personas);
        stdout.write_all(menu.as_bytes()).await.ok()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            stdout.write_all(b"> ").await.ok()?;
            stdout.flush().await.ok()?;

            // EOF 或读取失败视为放弃
            let line = lines.next_line().await.ok()??;
            match pick(personas, &line) {
                Some(p) => return Some(p.slug.clone()),
                None => {
                    let hint = format!("Enter a number between 1 and {} or a slug\n", personas.len());
                    stdout.write_all(hint.as_bytes()).await.ok()?;
                }
            }
        }
    }
}

pub fn render_menu(personas: &[Persona]) -> String {
    let mut out = String::from("Select an AI character that will be used for all accounts:\n");
    for (i, p) in personas.iter().enumerate() {
        out.push_str(&format!("  {:>2}. {} ({})\n", i + 1, p.title, p.slug));
    }
    out
}

/// 解析用户输入：1 起始的序号或完整 slug
pub fn pick<'a>(personas: &'a [Persona], input: &str) -> Option<&'a Persona> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| personas.get(i));
    }
    personas.iter().find(|p| p.slug == input)
}
