use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use broker_core::config::AppConfig;
use tracing::info;

use crate::checks::{run_checks, CHECKS};
use crate::simulation;

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 运行自检步骤表
    Check,
    /// 运行厨房模拟
    Simulate,
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check" => Ok(AppMode::Check),
            "simulate" => Ok(AppMode::Simulate),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {s}")),
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMode::Check => f.write_str("check"),
            AppMode::Simulate => f.write_str("simulate"),
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        info!(
            "初始化应用程序，模式: {}，选择策略: {}",
            mode,
            config.dispatcher.selection_strategy.as_str()
        );
        Self { config, mode }
    }

    /// 运行应用程序，返回进程退出码
    pub async fn run(&self) -> Result<i32> {
        match self.mode {
            AppMode::Check => {
                let report = run_checks(CHECKS, &self.config.dispatcher).await;
                report.log();
                Ok(report.exit_code())
            }
            AppMode::Simulate => {
                let report = simulation::run(&self.config).await?;
                report.log();
                Ok(if report.is_clean() { 0 } else { 1 })
            }
        }
    }
}
