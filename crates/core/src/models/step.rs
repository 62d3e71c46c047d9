use serde::{Deserialize, Serialize};

/// 会合协议的四个步骤，严格按声明顺序执行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendezvousStep {
    /// 从订单通道拉取订单内容
    PullOrder,
    /// 将订单内容推送给服务者
    PushProvider,
    /// 从服务者通道拉取结果
    PullProvider,
    /// 将结果推送回订单通道
    PushOrder,
}

impl RendezvousStep {
    pub const ALL: [RendezvousStep; 4] = [
        RendezvousStep::PullOrder,
        RendezvousStep::PushProvider,
        RendezvousStep::PullProvider,
        RendezvousStep::PushOrder,
    ];

    /// 从1开始的步骤序号
    pub fn number(&self) -> u8 {
        match self {
            RendezvousStep::PullOrder => 1,
            RendezvousStep::PushProvider => 2,
            RendezvousStep::PullProvider => 3,
            RendezvousStep::PushOrder => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RendezvousStep::PullOrder => "order.pull",
            RendezvousStep::PushProvider => "provider.push",
            RendezvousStep::PullProvider => "provider.pull",
            RendezvousStep::PushOrder => "order.push",
        }
    }
}

impl std::fmt::Display for RendezvousStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.number(), self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_numbered_in_order() {
        let numbers: Vec<u8> = RendezvousStep::ALL.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(RendezvousStep::PullProvider.to_string(), "3:provider.pull");
    }
}
