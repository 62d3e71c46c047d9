use crate::models::Candidate;

/// 服务者选择策略接口
///
/// 在注册表锁内调用，因此必须是同步且不挂起的。
pub trait SelectionStrategy: Send + Sync {
    /// 从候选者中为该专长选择一个服务者id
    fn select(&self, specialty: &str, candidates: &[Candidate]) -> Option<String>;

    /// 获取策略名称
    fn name(&self) -> &str;
}
