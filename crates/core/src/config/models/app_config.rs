use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{dispatcher::DispatcherConfig, logging::LogConfig, simulation::SimulationConfig};
use crate::config::validation::ConfigValidator;
use crate::{BrokerError, BrokerResult};

const DEFAULT_PATHS: [&str; 3] = [
    "config/broker.toml",
    "broker.toml",
    "/etc/broker/config.toml",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub logging: LogConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// 加载配置。显式指定的文件必须存在；否则依次尝试默认路径，都不存在时使用内置默认值。
    pub fn load(config_path: Option<&str>) -> BrokerResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(BrokerError::Configuration(format!("配置文件不存在: {path}")));
            }
            debug!("加载配置文件: {}", path);
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_PATHS.iter().find(|p| Path::new(p).exists()) {
            debug!("使用默认路径的配置文件: {}", path);
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            debug!("未找到配置文件，使用内置默认值");
        }

        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix("BROKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 字符串加载，不读取环境变量
    pub fn from_toml_str(content: &str) -> BrokerResult<Self> {
        let config: AppConfig = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> BrokerResult<()> {
        self.dispatcher.validate()?;
        self.logging.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}
