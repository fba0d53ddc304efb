//! 账号来源：按行读取的纯文本文件，每个非空行是一条原始凭据

use std::path::{Path, PathBuf};

/// 账号文件；每个循环开头整体读入一次
#[derive(Debug, Clone)]
pub struct AccountSource {
    path: PathBuf,
}

impl AccountSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部非空行（已去除首尾空白，兼容 CRLF）
    pub async fn load(&self) -> std::io::Result<Vec<String>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(split_accounts(&content))
    }
}

pub fn split_accounts(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
