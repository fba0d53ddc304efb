//! 终端倒计时：在同一行原地刷新剩余时间
//!
//! 下一轮等待显示 "Next cycle in: HH:MM:SS"，出错重试显示 "Retrying in: MM:SS"。

use std::io::{self, Write};
use std::time::Duration;

use crossterm::{
    cursor::MoveToColumn,
    execute,
    style::Print,
    terminal::{Clear, ClearType},
};

/// 剩余时间的显示格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownFormat {
    HoursMinutesSeconds,
    MinutesSeconds,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    label: String,
    format: CountdownFormat,
    /// 是否在终端绘制；测试与非 tty 场景可关闭
    render: bool,
}

impl Countdown {
    pub fn new(label: impl Into<String>, format: CountdownFormat) -> Self {
        Self {
            label: label.into(),
            format,
            render: true,
        }
    }

    pub fn next_cycle() -> Self {
        Self::new("Next cycle in: ", CountdownFormat::HoursMinutesSeconds)
    }

    pub fn retry() -> Self {
        Self::new("Retrying in: ", CountdownFormat::MinutesSeconds)
    }

    pub fn silent(mut self) -> Self {
        self.render = false;
        self
    }

    /// 倒数 total，每秒刷新一次
    pub async fn run(&self, total: Duration) {
        let resume_at = chrono::Local::now()
            + chrono::Duration::from_std(total).unwrap_or_else(|_| chrono::Duration::zero());
        tracing::info!("Waiting until {}", resume_at.format("%Y-%m-%d %H:%M:%S"));

        let mut remaining = total.as_secs();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            if self.render {
                // 绘制失败不影响等待
                let _ = self.draw(remaining);
            }
            if remaining == 0 {
                break;
            }
            remaining -= 1;
        }
        if self.render {
            let mut stdout = io::stdout();
            let _ = execute!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine));
        }
    }

    fn draw(&self, remaining: u64) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(format!("{}{}", self.label, format_remaining(remaining, self.format)))
        )?;
        stdout.flush()
    }
}

pub fn format_remaining(secs: u64, format: CountdownFormat) -> String {
    match format {
        CountdownFormat::HoursMinutesSeconds => {
            format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
        // 超过一小时的分钟数照常累加
        CountdownFormat::MinutesSeconds => format!("{:02}:{:02}", secs / 60, secs % 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        use CountdownFormat::*;
        assert_eq!(format_remaining(86_400, HoursMinutesSeconds), "24:00:00");
        assert_eq!(format_remaining(3_661, HoursMinutesSeconds), "01:01:01");
        assert_eq!(format_remaining(3_600, MinutesSeconds), "60:00");
        assert_eq!(format_remaining(59, MinutesSeconds), "00:59");
        assert_eq!(format_remaining(0, HoursMinutesSeconds), "00:00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_waits_full_duration() {
        let start = tokio::time::Instant::now();
        Countdown::retry().silent().run(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
