//! 循环调度：首次选择角色，然后逐个处理账号；成功后等待下一轮，出错则缩短为重试等待
//!
//! 账号级失败只影响该账号；只有读取账号文件或选择角色失败才算整轮失败。

use std::sync::Arc;
use std::time::Duration;

use crossterm::tty::IsTty;

use crate::account::{AccountIdentity, AccountSource, UserDefaults};
use crate::config::AppConfig;
use crate::core::orchestrator::{handle_account, ExchangeSettings};
use crate::core::{AccountReport, CycleError, RunContext};
use crate::reply::ReplyGenerator;
use crate::service::ServiceFactory;
use crate::ui::{Countdown, PersonaSelector};

/// 调度间隔与角色列表分页
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub cycle_interval: Duration,
    pub retry_interval: Duration,
    pub account_delay: Duration,
    pub persona_page_size: u32,
    /// 等待期间是否在终端绘制倒计时
    pub render_countdown: bool,
}

impl ScheduleSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cycle_interval: Duration::from_secs(config.schedule.cycle_interval_secs),
            retry_interval: Duration::from_secs(config.schedule.retry_interval_secs),
            account_delay: Duration::from_secs(config.schedule.account_delay_secs),
            persona_page_size: config.service.persona_page_size,
            render_countdown: std::io::stdout().is_tty(),
        }
    }
}

/// 一轮处理的汇总
#[derive(Debug, Default)]
pub struct CycleReport {
    pub accounts: Vec<AccountReport>,
    /// 本轮消耗的 (prompt, completion, total) token
    pub token_usage: (u64, u64, u64),
}

impl CycleReport {
    pub fn completed(&self) -> usize {
        self.accounts
            .iter()
            .filter(|r| r.termination.is_completed())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.accounts.len() - self.completed()
    }
}

pub struct CycleScheduler {
    settings: ScheduleSettings,
    source: AccountSource,
    factory: Arc<dyn ServiceFactory>,
    generator: ReplyGenerator,
    selector: Box<dyn PersonaSelector>,
    exchange: ExchangeSettings,
    defaults: UserDefaults,
    context: Option<RunContext>,
    /// 上一轮结束时的累计 token 数
    usage_baseline: (u64, u64, u64),
}

impl CycleScheduler {
    pub fn new(
        settings: ScheduleSettings,
        source: AccountSource,
        factory: Arc<dyn ServiceFactory>,
        generator: ReplyGenerator,
        selector: Box<dyn PersonaSelector>,
    ) -> Self {
        Self {
            settings,
            source,
            factory,
            generator,
            selector,
            exchange: ExchangeSettings::default(),
            defaults: UserDefaults::default(),
            context: None,
            usage_baseline: (0, 0, 0),
        }
    }

    pub fn with_exchange(mut self, exchange: ExchangeSettings) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn with_defaults(mut self, defaults: UserDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// 已选定的角色；首轮成功选择前为 None
    pub fn context(&self) -> Option<&RunContext> {
        self.context.as_ref()
    }

    /// 用第一个账号登录、拉取角色列表并让 selector 选择，再取详情
    pub async fn select_persona(&self) -> Result<RunContext, CycleError> {
        let accounts = self.load_accounts().await?;
        let first = accounts
            .first()
            .ok_or_else(|| CycleError::NoAccounts(self.source.path().display().to_string()))?;

        let identity = AccountIdentity::parse_with(first, &self.defaults)
            .map_err(|e| CycleError::PersonaSelection(e.to_string()))?;
        let service = self
            .factory
            .connect(&identity)
            .map_err(|e| CycleError::PersonaSelection(e.to_string()))?;

        if !service.authenticate(&identity).await {
            return Err(CycleError::PersonaSelection("Login failed".into()));
        }

        let personas = service
            .list_personas(1, self.settings.persona_page_size)
            .await;
        if personas.is_empty() {
            return Err(CycleError::PersonaSelection(
                "No AI characters available".into(),
            ));
        }

        let slug = self
            .selector
            .select(&personas)
            .await
            .ok_or_else(|| CycleError::PersonaSelection("No AI character selected".into()))?;

        let persona = service
            .fetch_persona_detail(&slug)
            .await
            .ok_or_else(|| CycleError::PersonaSelection(format!("Select AI error: {}", slug)))?;

        tracing::info!("Selected AI: {}", persona.title);
        tracing::info!("This AI will be used for all accounts.");
        Ok(RunContext::new(persona))
    }

    /// 跑一整轮
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        if self.context.is_none() {
            self.context = Some(self.select_persona().await?);
        }
        let Some(context) = self.context.as_ref() else {
            return Err(CycleError::PersonaSelection("No AI character selected".into()));
        };

        let accounts = self.load_accounts().await?;
        if accounts.is_empty() {
            return Err(CycleError::NoAccounts(
                self.source.path().display().to_string(),
            ));
        }

        let mut report = CycleReport::default();
        for raw in &accounts {
            let account = handle_account(
                raw,
                &self.defaults,
                self.factory.as_ref(),
                &self.generator,
                context,
                &self.exchange,
            )
            .await;
            report.accounts.push(account);

            if !self.settings.account_delay.is_zero() {
                tokio::time::sleep(self.settings.account_delay).await;
            }
        }

        let cumulative = self.generator.token_usage();
        let (base_prompt, base_completion, base_total) = self.usage_baseline;
        report.token_usage = (
            cumulative.0.saturating_sub(base_prompt),
            cumulative.1.saturating_sub(base_completion),
            cumulative.2.saturating_sub(base_total),
        );
        self.usage_baseline = cumulative;

        tracing::info!(
            completed = report.completed(),
            failed = report.failed(),
            cycle_prompt_tokens = report.token_usage.0,
            cycle_completion_tokens = report.token_usage.1,
            cycle_total_tokens = report.token_usage.2,
            cumulative_total_tokens = cumulative.2,
            "Daily Cycle Completed"
        );
        Ok(report)
    }

    /// 根据本轮结果决定等待多久以及倒计时样式
    pub fn wait_plan(&self, result: &Result<CycleReport, CycleError>) -> (Countdown, Duration) {
        let (countdown, wait) = match result {
            Ok(_) => {
                tracing::info!("Waiting for next cycle...");
                (Countdown::next_cycle(), self.settings.cycle_interval)
            }
            Err(e) => {
                tracing::error!("Main loop error: {}", e);
                tracing::warn!("Retrying in {} minutes...", self.settings.retry_interval.as_secs() / 60);
                (Countdown::retry(), self.settings.retry_interval)
            }
        };
        if self.settings.render_countdown {
            (countdown, wait)
        } else {
            (countdown.silent(), wait)
        }
    }

    /// 永久循环
    pub async fn run_forever(&mut self) {
        loop {
            let result = self.run_cycle().await;
            let (countdown, wait) = self.wait_plan(&result);
            countdown.run(wait).await;
        }
    }

    async fn load_accounts(&self) -> Result<Vec<String>, CycleError> {
        self.source.load().await.map_err(|e| {
            tracing::error!(path = %self.source.path().display(), "Error reading accounts: {}", e);
            CycleError::AccountSource(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::core::{ChatError, Termination};
    use crate::llm::MockLlmClient;
    use crate::service::{MockChatService, MockServiceFactory, Persona};
    use crate::ui::FixedSelector;

    fn persona() -> Persona {
        Persona {
            id: "5".into(),
            slug: "behind-the-glas".into(),
            title: "Mira".into(),
            description: "a shy librarian".into(),
        }
    }

    fn raw(id: u32, name: &str) -> String {
        format!(
            "user=%7B%22id%22%3A{}%2C%22first_name%22%3A%22{}%22%7D&chat_instance=77&hash=h{}",
            id, name, id
        )
    }

    fn accounts_file(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn settings() -> ScheduleSettings {
        ScheduleSettings {
            cycle_interval: Duration::from_secs(86_400),
            retry_interval: Duration::from_secs(3_600),
            account_delay: Duration::ZERO,
            persona_page_size: 100,
            render_countdown: false,
        }
    }

    fn account(personas: bool, auth: bool) -> Arc<MockChatService> {
        let svc = MockChatService::new()
            .with_auth(auth)
            .with_replies([Some("hello"), None]);
        Arc::new(if personas {
            svc.with_personas(vec![persona()])
        } else {
            svc
        })
    }

    fn scheduler(file: &NamedTempFile, factory: MockServiceFactory, slug: &str) -> CycleScheduler {
        let llm = Arc::new(MockLlmClient::scripted([Some("nice"), Some("again")]));
        CycleScheduler::new(
            settings(),
            AccountSource::new(file.path()),
            Arc::new(factory),
            ReplyGenerator::new(llm),
            Box::new(FixedSelector::new(slug)),
        )
    }

    #[tokio::test]
    async fn test_failed_account_does_not_stop_cycle() {
        let file = accounts_file(&[raw(1, "Ana"), raw(2, "Bo"), raw(3, "Cy")]);
        let first = account(true, true);
        let second = account(true, false);
        let third = account(true, true);
        let factory = MockServiceFactory::new()
            .with_account("1", first.clone())
            .with_account("2", second.clone())
            .with_account("3", third.clone());

        let mut scheduler = scheduler(&file, factory, "behind-the-glas");
        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.accounts.len(), 3);
        assert_eq!(report.completed(), 2);
        assert!(matches!(
            report.accounts[1].termination,
            Termination::Failed(_, ChatError::Auth)
        ));
        assert_eq!(second.count("fetch_persona_detail"), 0);
        assert_eq!(third.count("send_message"), 2);
        assert_eq!(
            scheduler.context().map(|c| c.persona_slug()),
            Some("behind-the-glas")
        );
    }

    #[tokio::test]
    async fn test_persona_selected_once_across_cycles() {
        let file = accounts_file(&[raw(1, "Ana")]);
        let first = account(true, true);
        let factory = MockServiceFactory::new().with_account("1", first.clone());

        let mut scheduler = scheduler(&file, factory, "behind-the-glas");
        scheduler.run_cycle().await.unwrap();
        scheduler.run_cycle().await.unwrap();

        assert_eq!(first.count("list_personas"), 1);
        // 选择时一次，两轮各一次
        assert_eq!(first.count("fetch_persona_detail"), 3);
    }

    #[tokio::test]
    async fn test_empty_account_file() {
        let file = accounts_file(&["".to_string(), "   ".to_string()]);
        let mut scheduler = scheduler(&file, MockServiceFactory::new(), "behind-the-glas");
        let err = scheduler.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::NoAccounts(_)));
        assert!(scheduler.context().is_none());
    }

    #[tokio::test]
    async fn test_missing_account_file() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        let mut scheduler = CycleScheduler::new(
            settings(),
            AccountSource::new(dir.path().join("data.txt")),
            Arc::new(MockServiceFactory::new()),
            ReplyGenerator::new(llm),
            Box::new(FixedSelector::new("x")),
        );
        assert!(matches!(
            scheduler.run_cycle().await,
            Err(CycleError::AccountSource(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_persona_fails_selection() {
        let file = accounts_file(&[raw(1, "Ana")]);
        let factory = MockServiceFactory::new().with_fallback(account(true, true));
        let mut scheduler = scheduler(&file, factory, "nobody");
        assert!(matches!(
            scheduler.run_cycle().await,
            Err(CycleError::PersonaSelection(_))
        ));
    }

    #[tokio::test]
    async fn test_no_personas_listed_fails_selection() {
        let file = accounts_file(&[raw(1, "Ana")]);
        let factory = MockServiceFactory::new().with_fallback(account(false, true));
        let mut scheduler = scheduler(&file, factory, "behind-the-glas");
        let err = scheduler.run_cycle().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to select initial AI: No AI characters available"
        );
    }

    #[tokio::test]
    async fn test_wait_plan_uses_retry_interval_on_error() {
        let file = accounts_file(&[]);
        let scheduler = scheduler(&file, MockServiceFactory::new(), "x");

        let (_, wait) = scheduler.wait_plan(&Ok(CycleReport::default()));
        assert_eq!(wait, Duration::from_secs(86_400));

        let (_, wait) = scheduler.wait_plan(&Err(CycleError::NoAccounts("data.txt".into())));
        assert_eq!(wait, Duration::from_secs(3_600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_after_each_account() {
        let file = accounts_file(&[raw(1, "Ana"), raw(2, "Bo")]);
        let factory = MockServiceFactory::new().with_fallback(account(true, true));
        let mut scheduler = scheduler(&file, factory, "behind-the-glas");
        scheduler.settings.account_delay = Duration::from_secs(5);

        let start = tokio::time::Instant::now();
        scheduler.run_cycle().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    /// 依次返回预设结果的选择器
    struct ScriptedSelector {
        picks: std::sync::Mutex<std::collections::VecDeque<Option<String>>>,
    }

    #[async_trait::async_trait]
    impl PersonaSelector for ScriptedSelector {
        async fn select(&self, _personas: &[Persona]) -> Option<String> {
            self.picks.lock().ok().and_then(|mut p| p.pop_front()).flatten()
        }
    }

    #[tokio::test]
    async fn test_failed_selection_is_retried_next_cycle() {
        let file = accounts_file(&[raw(1, "Ana")]);
        let first = account(true, true);
        let selector = ScriptedSelector {
            picks: std::sync::Mutex::new([None, Some("behind-the-glas".to_string())].into()),
        };
        let mut scheduler = CycleScheduler::new(
            settings(),
            AccountSource::new(file.path()),
            Arc::new(MockServiceFactory::new().with_account("1", first.clone())),
            ReplyGenerator::new(Arc::new(MockLlmClient::new())),
            Box::new(selector),
        );

        let err = scheduler.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::PersonaSelection(_)));
        assert!(scheduler.context().is_none());
        assert_eq!(first.count("send_message"), 0);

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.completed(), 1);
        assert_eq!(first.count("list_personas"), 2);
        assert_eq!(
            scheduler.context().map(|c| c.persona_slug()),
            Some("behind-the-glas")
        );
    }

    #[tokio::test]
    async fn test_token_usage_is_reported_per_cycle() {
        let file = accounts_file(&[raw(1, "Ana")]);
        let first = Arc::new(
            MockChatService::new()
                .with_personas(vec![persona()])
                .with_replies([Some("hello"), None, Some("hello again"), None]),
        );
        let llm = MockLlmClient::scripted([Some("nice"), Some("again")]).with_usage_per_call(10, 5);
        let mut scheduler = CycleScheduler::new(
            settings(),
            AccountSource::new(file.path()),
            Arc::new(MockServiceFactory::new().with_account("1", first)),
            ReplyGenerator::new(Arc::new(llm)),
            Box::new(FixedSelector::new("behind-the-glas")),
        );

        assert_eq!(scheduler.run_cycle().await.unwrap().token_usage, (10, 5, 15));
        assert_eq!(scheduler.run_cycle().await.unwrap().token_usage, (10, 5, 15));
    }

    #[test]
    fn test_settings_from_config() {
        let config = AppConfig::default();
        let settings = ScheduleSettings::from_config(&config);
        assert_eq!(settings.cycle_interval, Duration::from_secs(86_400));
        assert_eq!(settings.retry_interval, Duration::from_secs(3_600));
        assert_eq!(settings.account_delay, Duration::from_secs(5));
        // 输出被重定向时不绘制倒计时
        assert_eq!(settings.render_countdown, std::io::stdout().is_tty());
    }
}
