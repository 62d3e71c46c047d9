use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::Channel;

/// 在岗服务者条目
#[derive(Clone)]
pub struct ProviderEntry {
    pub id: String,
    pub specialties: BTreeSet<String>,
    pub channel: Arc<dyn Channel>,
    pub available: bool,
    /// 注册序号，同一id重新注册时递增，用于区分新旧注册
    pub registration: u64,
    /// 已完成的会合次数
    pub served: u64,
    pub on_duty_since: DateTime<Utc>,
}

impl ProviderEntry {
    /// 创建新的服务者条目，初始即可用
    pub fn new(
        id: String,
        specialties: BTreeSet<String>,
        channel: Arc<dyn Channel>,
        registration: u64,
    ) -> Self {
        Self {
            id,
            specialties,
            channel,
            available: true,
            registration,
            served: 0,
            on_duty_since: Utc::now(),
        }
    }

    /// 检查是否具备该专长
    pub fn offers(&self, specialty: &str) -> bool {
        self.specialties.contains(specialty)
    }

    /// 检查当前是否可以接受该专长的订单
    pub fn can_serve(&self, specialty: &str) -> bool {
        self.available && self.offers(specialty)
    }

    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            id: self.id.clone(),
            specialties: self.specialties.clone(),
            served: self.served,
            registration: self.registration,
        }
    }

    pub fn to_status(&self) -> ProviderStatus {
        ProviderStatus {
            id: self.id.clone(),
            specialties: self.specialties.iter().cloned().collect(),
            available: self.available,
            served: self.served,
            on_duty_since: self.on_duty_since,
        }
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.id)
            .field("specialties", &self.specialties)
            .field("available", &self.available)
            .field("registration", &self.registration)
            .field("served", &self.served)
            .field("on_duty_since", &self.on_duty_since)
            .finish_non_exhaustive()
    }
}

/// 候选者快照，交给选择策略使用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub specialties: BTreeSet<String>,
    pub served: u64,
    pub registration: u64,
}

impl Candidate {
    pub fn offers(&self, specialty: &str) -> bool {
        self.specialties.contains(specialty)
    }

    /// 只具备这一项专长
    pub fn is_specialist_for(&self, specialty: &str) -> bool {
        self.specialties.len() == 1 && self.offers(specialty)
    }
}

/// 服务者状态，用于注册表自省
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub id: String,
    pub specialties: Vec<String>,
    pub available: bool,
    pub served: u64,
    pub on_duty_since: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, specialties: &[&str]) -> Candidate {
        Candidate {
            id: id.to_string(),
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
            served: 0,
            registration: 1,
        }
    }

    #[test]
    fn test_specialist_detection() {
        assert!(candidate("a", &["pasta"]).is_specialist_for("pasta"));
        assert!(!candidate("b", &["pasta", "meat"]).is_specialist_for("pasta"));
        assert!(!candidate("c", &["meat"]).is_specialist_for("pasta"));
    }
}
