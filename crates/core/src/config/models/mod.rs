pub mod app_config;
pub mod dispatcher;
pub mod logging;
pub mod simulation;

pub use app_config::AppConfig;
pub use dispatcher::{DispatcherConfig, SelectionStrategyKind, TimeoutPolicy};
pub use logging::{LogConfig, LogLevel, OutputFormat};
pub use simulation::{SimulationConfig, StaffConfig};
