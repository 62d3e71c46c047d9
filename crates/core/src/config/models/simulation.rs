use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigValidator, ValidationUtils};
use crate::{BrokerError, BrokerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffConfig {
    pub id: String,
    pub specialties: Vec<String>,
}

impl StaffConfig {
    pub fn new(id: &str, specialties: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// 模拟模式的厨房配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub staff: Vec<StaffConfig>,
    /// 提交的订单总数，专长在花名册的全部专长中轮转
    pub orders: usize,
    /// 服务者处理一份订单的耗时
    pub think_time_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            staff: vec![
                StaffConfig::new("chef-pasta", &["pasta"]),
                StaffConfig::new("chef-grill", &["meat", "vegetables"]),
                StaffConfig::new("chef-pastry", &["dessert"]),
                StaffConfig::new("runner", &["non-food", "dessert"]),
            ],
            orders: 30,
            think_time_ms: 20,
        }
    }
}

impl SimulationConfig {
    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }

    /// 花名册覆盖的全部专长，按字典序
    pub fn specialties(&self) -> Vec<String> {
        self.staff
            .iter()
            .flat_map(|staff| staff.specialties.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl ConfigValidator for SimulationConfig {
    fn validate(&self) -> BrokerResult<()> {
        ValidationUtils::validate_count(self.staff.len(), "simulation.staff", 1000)?;
        ValidationUtils::validate_count(self.orders, "simulation.orders", 100_000)?;

        let mut seen = HashSet::new();
        for staff in &self.staff {
            ValidationUtils::validate_not_empty(&staff.id, "simulation.staff.id")?;
            if !seen.insert(staff.id.as_str()) {
                return Err(BrokerError::Configuration(format!(
                    "simulation.staff contains duplicate id: {}",
                    staff.id
                )));
            }
            if staff.specialties.is_empty() {
                return Err(BrokerError::Configuration(format!(
                    "simulation.staff.{}.specialties cannot be empty",
                    staff.id
                )));
            }
            for specialty in &staff.specialties {
                ValidationUtils::validate_not_empty(specialty, "simulation.staff.specialties")?;
            }
        }

        Ok(())
    }
}
