//! Autochat 入口：初始化日志、加载配置、选择角色并进入每日循环

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use autochat::account::{AccountSource, UserDefaults};
use autochat::config::{load_config, AppConfig};
use autochat::core::{CycleScheduler, ExchangeSettings, ScheduleSettings};
use autochat::llm::create_llm_from_config;
use autochat::reply::ReplyGenerator;
use autochat::service::HttpServiceFactory;
use autochat::ui::{ConsoleSelector, FixedSelector, PersonaSelector};

const BANNER: &str = r#"
   ___       __           __        __
  / _ |__ __/ /____  ____/ /  ___ _/ /_
 / __ / // / __/ _ \/ __/ _ \/ _ `/ __/
/_/ |_\_,_/\__/\___/\__/_//_/\_,_/\__/
"#;

#[derive(Parser, Debug)]
#[command(name = "autochat", version, about = "Multi-account autonomous chat bot")]
struct Args {
    /// 配置文件路径（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 账号文件路径
    #[arg(short, long)]
    accounts: Option<PathBuf>,

    /// 直接使用该角色 slug，跳过交互选择
    #[arg(short, long)]
    persona: Option<String>,

    /// 只跑一轮后退出
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    autochat::observability::init();
    let args = Args::parse();

    tracing::info!("{}", BANNER);

    let config = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let llm = create_llm_from_config(&config.llm).context("Failed to create LLM client")?;
    let generator = ReplyGenerator::new(llm);

    let accounts = args
        .accounts
        .unwrap_or_else(|| config.chat.accounts_file.clone());
    let selector: Box<dyn PersonaSelector> = match args.persona.or(config.chat.persona.clone()) {
        Some(slug) => Box::new(FixedSelector::new(slug)),
        None => Box::new(ConsoleSelector::new()),
    };

    let mut scheduler = CycleScheduler::new(
        ScheduleSettings::from_config(&config),
        AccountSource::new(accounts),
        Arc::new(HttpServiceFactory::new(&config.service, &config.user)),
        generator,
        selector,
    )
    .with_exchange(ExchangeSettings::from(&config.chat))
    .with_defaults(UserDefaults::from(&config.user));

    if args.once {
        let report = scheduler.run_cycle().await.context("Cycle failed")?;
        tracing::info!(
            completed = report.completed(),
            failed = report.failed(),
            "Single cycle finished"
        );
        return Ok(());
    }

    scheduler.run_forever().await;
    Ok(())
}
