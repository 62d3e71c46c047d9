use std::io::Write;

use anyhow::Result;
use broker::simulation;
use broker_core::config::{AppConfig, SelectionStrategyKind, StaffConfig};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_simulation_is_clean() -> Result<()> {
    let mut config = AppConfig::default();
    config.simulation.think_time_ms = 1;

    let report = simulation::run(&config).await?;

    assert!(report.is_clean(), "{:?}", report.mismatched);
    assert_eq!(report.completed, config.simulation.orders);
    assert_eq!(report.stats.orders_completed, config.simulation.orders as u64);
    assert_eq!(report.stats.registrations, config.simulation.staff.len() as u64);
    assert_eq!(report.stats.deregistrations, config.simulation.staff.len() as u64);
    assert_eq!(
        report.served_by.values().sum::<usize>(),
        config.simulation.orders
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_provider_serves_everything_in_turn() -> Result<()> {
    let mut config = AppConfig::default();
    config.dispatcher.selection_strategy = SelectionStrategyKind::LeastUsed;
    config.simulation.staff = vec![StaffConfig::new("solo", &["pasta", "dessert"])];
    config.simulation.orders = 12;
    config.simulation.think_time_ms = 1;

    let report = simulation::run(&config).await?;

    assert!(report.is_clean(), "{:?}", report.mismatched);
    assert_eq!(report.served_by.get("solo"), Some(&12));
    assert!(report.stats.orders_waited > 0);
    Ok(())
}

#[tokio::test]
async fn test_simulation_from_config_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"
[dispatcher]
selection_strategy = "specialist"

[simulation]
orders = 8
think_time_ms = 1

[[simulation.staff]]
id = "generalist"
specialties = ["meat", "vegetables"]

[[simulation.staff]]
id = "grill"
specialties = ["meat"]
"#
    )?;

    let config = AppConfig::load(file.path().to_str())?;
    let report = simulation::run(&config).await?;

    assert!(report.is_clean(), "{:?}", report.mismatched);
    assert_eq!(report.orders, 8);
    // vegetables 只能由 generalist 完成
    assert!(report.served_by.get("generalist").copied().unwrap_or(0) >= 4);
    Ok(())
}
