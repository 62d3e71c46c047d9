//! 自检步骤表
//!
//! 每个步骤在独立任务中并发运行，端到端地驱动一个全新的分派器。必需步骤失败时
//! 报告序号最小的那一个并以非零码退出；只有可选步骤失败时报告序号最小的可选失败。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use broker_core::config::DispatcherConfig;
use broker_core::{BrokerError, Channel, Event};
use broker_dispatcher::Dispatcher;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::fixtures::{wait_for, GatedChannel, Journal, RecordingChannel, SPECIALTIES, STAFF_IDS};

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const PATIENCE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CheckFailure {
    message: String,
}

impl CheckFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BrokerError> for CheckFailure {
    fn from(err: BrokerError) -> Self {
        Self::new(format!("代理返回错误: {err}"))
    }
}

pub type CheckResult = Result<(), CheckFailure>;
pub type CheckFn = fn(DispatcherConfig) -> BoxFuture<'static, CheckResult>;

/// 步骤表中的一项
pub struct CheckStep {
    pub name: &'static str,
    pub ordinal: u32,
    pub required: bool,
    pub description: &'static str,
    pub run: CheckFn,
}

pub static CHECKS: &[CheckStep] = &[
    CheckStep {
        name: "registration",
        ordinal: 1,
        required: true,
        description: "服务者上岗后可按id找到，下岗后被移除",
        run: registration,
    },
    CheckStep {
        name: "deregistration",
        ordinal: 2,
        required: false,
        description: "多名服务者全部下岗后注册表为空",
        run: deregistration,
    },
    CheckStep {
        name: "single_delivery",
        ordinal: 3,
        required: true,
        description: "订单内容送达服务者，结果送回订单",
        run: single_delivery,
    },
    CheckStep {
        name: "multiple_deliveries",
        ordinal: 3,
        required: true,
        description: "每份订单都由同一名服务者接收并返回结果",
        run: multiple_deliveries,
    },
    CheckStep {
        name: "specialty_match",
        ordinal: 4,
        required: true,
        description: "订单只交给具备该专长的服务者",
        run: specialty_match,
    },
    CheckStep {
        name: "uneven_specialties",
        ordinal: 4,
        required: true,
        description: "多名服务者共享同一专长时仍然匹配正确",
        run: uneven_specialties,
    },
    CheckStep {
        name: "multiple_specialties",
        ordinal: 5,
        required: false,
        description: "具备多个专长的服务者负责其全部专长",
        run: multiple_specialties,
    },
    CheckStep {
        name: "waiting_order",
        ordinal: 6,
        required: false,
        description: "没有匹配服务者的订单会等待而不是失败",
        run: waiting_order,
    },
    CheckStep {
        name: "exclusive_provider",
        ordinal: 6,
        required: false,
        description: "同一服务者不会同时参与两次会合",
        run: exclusive_provider,
    },
];

fn off_duty(id: &str) -> Event {
    let channel: Arc<dyn Channel> = RecordingChannel::idle().shared();
    Event::off_duty(id, channel)
}

fn ensure(condition: bool, message: &str) -> CheckResult {
    if condition {
        Ok(())
    } else {
        Err(CheckFailure::new(message))
    }
}

/// 最近一次推送给服务者的记录
fn last_served(journal: &Journal) -> Result<(String, serde_json::Value), CheckFailure> {
    let pushes = journal.pushes();
    ensure(pushes.len() == 1, "每份订单应当恰好推送给一名服务者一次")?;
    pushes
        .into_iter()
        .next()
        .ok_or_else(|| CheckFailure::new("没有服务者收到订单"))
}

fn registration(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let dispatcher = Dispatcher::new(config);
        let channel = RecordingChannel::idle().shared();

        dispatcher
            .handle(Event::on_duty(STAFF_IDS[0], &[SPECIALTIES[0]], channel.clone()))
            .await?;
        ensure(dispatcher.registry().len() == 1, "注册后在岗人数不正确")?;
        ensure(
            dispatcher.registry().contains(STAFF_IDS[0]),
            "服务者未按id注册",
        )?;
        ensure(channel.is_untouched(), "上岗时不应读写服务者通道")?;

        dispatcher.handle(off_duty(STAFF_IDS[0])).await?;
        ensure(dispatcher.registry().is_empty(), "下岗后服务者未被移除")
    }
    .boxed()
}

fn deregistration(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let dispatcher = Dispatcher::new(config);
        let mut channels = Vec::new();

        for (id, specialty) in STAFF_IDS.iter().zip(SPECIALTIES) {
            let channel = RecordingChannel::idle().shared();
            dispatcher
                .handle(Event::on_duty(id, &[specialty], channel.clone()))
                .await?;
            channels.push(channel);
        }
        ensure(
            dispatcher.registry().len() == STAFF_IDS.len(),
            "并非所有服务者都已注册",
        )?;

        for id in STAFF_IDS {
            dispatcher.handle(off_duty(id)).await?;
        }
        ensure(
            channels.iter().all(|channel| channel.is_untouched()),
            "上岗或下岗时不应读写服务者通道",
        )?;
        ensure(dispatcher.registry().is_empty(), "下岗后注册表不为空")
    }
    .boxed()
}

fn single_delivery(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let dispatcher = Dispatcher::new(config);
        let staff = RecordingChannel::new(json!("baked-cake")).shared();
        let order = RecordingChannel::new(json!("cake")).shared();

        dispatcher
            .handle(Event::on_duty("A", &["dessert"], staff.clone()))
            .await?;
        dispatcher
            .handle(Event::order("dessert", order.clone()))
            .await?;

        ensure(order.pull_count() == 1, "订单内容应当恰好拉取一次")?;
        ensure(
            staff.pushed() == vec![json!("cake")],
            "服务者应当恰好收到一次原始订单内容",
        )?;
        ensure(staff.pull_count() == 1, "服务者结果应当恰好拉取一次")?;
        ensure(
            order.pushed() == vec![json!("baked-cake")],
            "订单应当恰好收到一次服务者结果",
        )
    }
    .boxed()
}

fn multiple_deliveries(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let dispatcher = Dispatcher::new(config);
        let journal = Journal::new();

        for (id, specialty) in STAFF_IDS.iter().zip(SPECIALTIES.into_iter().rev()) {
            let staff = RecordingChannel::named(id, json!(format!("{id}-result")))
                .with_journal(&journal)
                .shared();
            dispatcher
                .handle(Event::on_duty(id, &[specialty], staff))
                .await?;
        }

        for (index, specialty) in SPECIALTIES.iter().enumerate() {
            journal.clear();
            let order = RecordingChannel::new(json!({ "order": index })).shared();
            dispatcher.handle(Event::order(specialty, order.clone())).await?;

            let (staff_id, payload) = last_served(&journal)?;
            ensure(payload == json!({ "order": index }), "服务者收到的订单内容被修改")?;
            ensure(
                journal.pulls() == vec![staff_id.clone()],
                "结果必须从接收订单的同一名服务者拉取",
            )?;
            ensure(
                order.pushed() == vec![json!(format!("{staff_id}-result"))],
                "订单收到的结果不是来自其服务者",
            )?;
        }
        Ok(())
    }
    .boxed()
}

/// 按给定花名册注册服务者，逐个提交订单并检查接单者具备该专长
async fn verify_matching(
    dispatcher: Dispatcher,
    roster: Vec<(&'static str, Vec<&'static str>)>,
    orders: Vec<&'static str>,
) -> CheckResult {
    let journal = Journal::new();
    let mut specialties: HashMap<&str, Vec<&str>> = HashMap::new();

    for (id, tags) in roster {
        let staff = RecordingChannel::named(id, json!(id))
            .with_journal(&journal)
            .shared();
        dispatcher.handle(Event::on_duty(id, &tags, staff)).await?;
        specialties.insert(id, tags);
    }

    for specialty in orders {
        journal.clear();
        dispatcher
            .handle(Event::order(specialty, RecordingChannel::idle().shared()))
            .await?;

        let (staff_id, _) = last_served(&journal)?;
        let matched = specialties
            .get(staff_id.as_str())
            .is_some_and(|tags| tags.contains(&specialty));
        ensure(matched, "订单专长与服务者专长不匹配")?;
    }
    Ok(())
}

fn specialty_match(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let roster = STAFF_IDS
            .iter()
            .zip(SPECIALTIES)
            .map(|(id, specialty)| (*id, vec![specialty]))
            .collect();
        let orders = SPECIALTIES.iter().copied().cycle().take(50).collect();
        verify_matching(Dispatcher::new(config), roster, orders).await
    }
    .boxed()
}

fn uneven_specialties(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let pair = [SPECIALTIES[0], SPECIALTIES[1]];
        let roster = STAFF_IDS
            .iter()
            .zip(pair.iter().cycle())
            .map(|(id, specialty)| (*id, vec![*specialty]))
            .collect();
        let orders = pair.iter().copied().cycle().take(10).collect();
        verify_matching(Dispatcher::new(config), roster, orders).await
    }
    .boxed()
}

fn multiple_specialties(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let roster = vec![
            (STAFF_IDS[0], vec![SPECIALTIES[0]]),
            (STAFF_IDS[1], SPECIALTIES[1..].to_vec()),
        ];
        let orders = SPECIALTIES.iter().copied().cycle().take(25).collect();
        verify_matching(Dispatcher::new(config), roster, orders).await
    }
    .boxed()
}

fn waiting_order(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        let dispatcher = Dispatcher::new(config);
        let order = RecordingChannel::new(json!("soup")).shared();

        let pending = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let event = Event::order("vegetables", order.clone());
            async move { dispatcher.handle(event).await }
        });

        let registry = dispatcher.registry().clone();
        let queued =
            wait_for(|| registry.waiting_orders("vegetables") == 1, PATIENCE).await;
        ensure(queued, "订单没有进入等待队列")?;
        ensure(order.is_untouched(), "等待中的订单不应被读取")?;

        let staff = RecordingChannel::new(json!("hot-soup")).shared();
        dispatcher
            .handle(Event::on_duty("cook", &["vegetables"], staff))
            .await?;

        pending
            .await
            .map_err(|e| CheckFailure::new(format!("等待中的订单任务异常: {e}")))??;
        ensure(
            order.pushed() == vec![json!("hot-soup")],
            "等待的订单在服务者上岗后没有得到结果",
        )
    }
    .boxed()
}

fn exclusive_provider(config: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async move {
        const ORDERS: usize = 3;
        let dispatcher = Dispatcher::new(config);
        let staff = GatedChannel::new(RecordingChannel::new(json!("dish"))).shared();
        dispatcher
            .handle(Event::on_duty("chef", &["pasta"], staff.clone()))
            .await?;

        let handles: Vec<_> = (0..ORDERS)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                let event = Event::order("pasta", RecordingChannel::new(json!(i)).shared());
                tokio::spawn(async move { dispatcher.handle(event).await })
            })
            .collect();

        for served in 0..ORDERS {
            let busy = wait_for(
                || staff.inner().pushed().len() == served + 1 && staff.active() == 1,
                PATIENCE,
            )
            .await;
            ensure(busy, "服务者没有按顺序接收订单")?;
            staff.open(1);
        }

        for joined in join_all(handles).await {
            joined.map_err(|e| CheckFailure::new(format!("订单任务异常: {e}")))??;
        }
        ensure(staff.max_active() == 1, "同一服务者同时参与了多次会合")
    }
    .boxed()
}

/// 单个步骤的运行结果
#[derive(Debug)]
pub struct CheckOutcome {
    pub step: &'static CheckStep,
    pub result: CheckResult,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    OptionalFailed { ordinal: u32 },
    RequiredFailed { ordinal: u32 },
}

#[derive(Debug)]
pub struct CheckReport {
    outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn outcomes(&self) -> &[CheckOutcome] {
        &self.outcomes
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// 序号最小的失败步骤，序号相同时取表中靠前者
    fn first_failure(&self, required: bool) -> Option<&CheckOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed() && o.step.required == required)
            .min_by_key(|o| o.step.ordinal)
    }

    pub fn required_failure(&self) -> Option<&CheckOutcome> {
        self.first_failure(true)
    }

    pub fn optional_failure(&self) -> Option<&CheckOutcome> {
        self.first_failure(false)
    }

    pub fn verdict(&self) -> Verdict {
        if let Some(outcome) = self.required_failure() {
            Verdict::RequiredFailed {
                ordinal: outcome.step.ordinal,
            }
        } else if let Some(outcome) = self.optional_failure() {
            Verdict::OptionalFailed {
                ordinal: outcome.step.ordinal,
            }
        } else {
            Verdict::Passed
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.verdict() {
            Verdict::RequiredFailed { .. } => 1,
            Verdict::OptionalFailed { .. } | Verdict::Passed => 0,
        }
    }

    pub fn log(&self) {
        if let Some(outcome) = self.required_failure() {
            error!(
                step = outcome.step.name,
                ordinal = outcome.step.ordinal,
                "必需检查未通过: {} ({}): {}",
                outcome.step.name,
                outcome.step.description,
                failure_message(outcome)
            );
        } else if let Some(outcome) = self.optional_failure() {
            warn!(
                step = outcome.step.name,
                ordinal = outcome.step.ordinal,
                "可选检查未通过: {} ({}): {}",
                outcome.step.name,
                outcome.step.description,
                failure_message(outcome)
            );
            warn!(
                "全部必需检查已通过，但在可选步骤 {} 失败",
                outcome.step.ordinal
            );
        } else {
            info!("全部 {} 项检查通过", self.outcomes.len());
        }
    }
}

fn failure_message(outcome: &CheckOutcome) -> &str {
    match &outcome.result {
        Ok(()) => "",
        Err(failure) => failure.message(),
    }
}

/// 并发运行全部步骤
pub async fn run_checks(steps: &'static [CheckStep], config: &DispatcherConfig) -> CheckReport {
    info!("开始运行 {} 项自检", steps.len());

    let handles: Vec<_> = steps
        .iter()
        .map(|step| {
            let check = (step.run)(config.clone());
            tokio::spawn(async move {
                match tokio::time::timeout(CHECK_TIMEOUT, check).await {
                    Ok(result) => result,
                    Err(_) => Err(CheckFailure::new(format!(
                        "超过 {} 秒未完成",
                        CHECK_TIMEOUT.as_secs()
                    ))),
                }
            })
        })
        .collect();

    let outcomes = steps
        .iter()
        .zip(join_all(handles).await)
        .map(|(step, joined)| {
            let result = joined
                .unwrap_or_else(|e| Err(CheckFailure::new(format!("检查异常终止: {e}"))));
            if let Err(failure) = &result {
                warn!(step = step.name, "检查失败: {}", failure);
            }
            CheckOutcome { step, result }
        })
        .collect();

    CheckReport { outcomes }
}

impl std::fmt::Debug for CheckStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckStep")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}
