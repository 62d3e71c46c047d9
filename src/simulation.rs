//! 厨房模拟
//!
//! 按配置的花名册让服务者上岗，每名服务者由一个任务扮演：收到订单内容后等待一段
//! 思考时间，再把带有自己id的结果交回代理。随后并发提交订单，核对每份结果都回到了
//! 自己的订单并且由具备该专长的服务者完成，最后让全部服务者下岗。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use broker_core::config::AppConfig;
use broker_core::memory::{duplex, ClientHandle};
use broker_core::{Channel, Event};
use broker_dispatcher::{DispatchStatsSnapshot, Dispatcher};
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 模拟结果
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub orders: usize,
    pub completed: usize,
    pub failed: usize,
    /// 结果没有回到自己订单，或交给了不具备该专长的服务者
    pub mismatched: Vec<String>,
    /// 每名服务者完成的订单数
    pub served_by: HashMap<String, usize>,
    pub stats: DispatchStatsSnapshot,
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.mismatched.is_empty() && self.completed == self.orders
    }

    pub fn log(&self) {
        info!(
            "模拟结束: 订单 {}，完成 {}，失败 {}，耗时 {:?}",
            self.orders, self.completed, self.failed, self.elapsed
        );
        let mut served: Vec<_> = self.served_by.iter().collect();
        served.sort();
        for (id, count) in served {
            info!("服务者 {} 完成订单 {} 份", id, count);
        }
        info!(
            "分派统计: 上岗 {}，下岗 {}，等待过的订单 {}，超时 {}",
            self.stats.registrations,
            self.stats.deregistrations,
            self.stats.orders_waited,
            self.stats.timeouts
        );
        for problem in &self.mismatched {
            warn!("结果核对失败: {}", problem);
        }
    }
}

/// 扮演一名服务者，直到其通道被代理释放
fn spawn_staff(id: String, think_time: Duration, handle: ClientHandle) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let (results, mut orders) = handle.split();
        let mut prepared = 0;
        while let Some(order) = orders.recv().await {
            tokio::time::sleep(think_time).await;
            let result = json!({ "prepared_by": id, "order": order });
            if results.send(result).is_err() {
                break;
            }
            prepared += 1;
            debug!("服务者 {} 完成一份订单", id);
        }
        prepared
    })
}

pub async fn run(config: &AppConfig) -> Result<SimulationReport> {
    let simulation = &config.simulation;
    let dispatcher = Dispatcher::new(config.dispatcher.clone());
    let started = Instant::now();

    let mut roster: HashMap<String, Vec<String>> = HashMap::new();
    let mut staff_tasks = Vec::new();
    for staff in &simulation.staff {
        let (channel, handle) = duplex();
        let specialties: Vec<&str> = staff.specialties.iter().map(String::as_str).collect();
        dispatcher
            .handle(Event::on_duty(&staff.id, &specialties, Arc::new(channel)))
            .await
            .with_context(|| format!("服务者 {} 上岗失败", staff.id))?;
        roster.insert(staff.id.clone(), staff.specialties.clone());
        staff_tasks.push(spawn_staff(
            staff.id.clone(),
            simulation.think_time(),
            handle,
        ));
    }

    let specialties = simulation.specialties();
    anyhow::ensure!(!specialties.is_empty(), "花名册中没有任何专长");
    info!(
        "{} 名服务者已上岗，提交 {} 份订单",
        roster.len(),
        simulation.orders
    );

    let order_tasks: Vec<JoinHandle<Result<Value>>> = (0..simulation.orders)
        .map(|number| {
            let specialty = specialties[number % specialties.len()].clone();
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let (channel, mut client) = duplex();
                client.feed(json!({ "number": number, "specialty": specialty }))?;
                dispatcher
                    .handle(Event::order(&specialty, Arc::new(channel)))
                    .await?;
                client
                    .recv()
                    .await
                    .with_context(|| format!("订单 {number} 没有收到结果"))
            })
        })
        .collect();

    let mut report = SimulationReport {
        orders: simulation.orders,
        completed: 0,
        failed: 0,
        mismatched: Vec::new(),
        served_by: HashMap::new(),
        stats: DispatchStatsSnapshot::default(),
        elapsed: Duration::ZERO,
    };

    for (number, joined) in join_all(order_tasks).await.into_iter().enumerate() {
        let result = match joined.context("订单任务异常终止").and_then(|r| r) {
            Ok(result) => result,
            Err(e) => {
                warn!("订单 {} 失败: {:#}", number, e);
                report.failed += 1;
                continue;
            }
        };
        report.completed += 1;

        let specialty = &specialties[number % specialties.len()];
        let prepared_by = result["prepared_by"].as_str().unwrap_or_default().to_string();
        if result["order"]["number"] != json!(number) {
            report
                .mismatched
                .push(format!("订单 {number} 收到了其他订单的结果: {result}"));
        }
        let qualified = roster
            .get(&prepared_by)
            .is_some_and(|tags| tags.contains(specialty));
        if !qualified {
            report.mismatched.push(format!(
                "订单 {number} ({specialty}) 由不具备该专长的服务者 {prepared_by} 完成"
            ));
        }
        *report.served_by.entry(prepared_by).or_default() += 1;
    }

    for id in roster.keys() {
        let unused: Arc<dyn Channel> = Arc::new(duplex().0);
        dispatcher
            .handle(Event::off_duty(id, unused))
            .await
            .with_context(|| format!("服务者 {id} 下岗失败"))?;
    }

    match tokio::time::timeout(DRAIN_TIMEOUT, join_all(staff_tasks)).await {
        Ok(prepared) => {
            let total: usize = prepared.into_iter().filter_map(|r| r.ok()).sum();
            debug!("服务者任务全部结束，共处理 {} 份订单", total);
        }
        Err(_) => warn!("服务者任务在下岗后仍未结束"),
    }

    report.stats = dispatcher.stats();
    report.elapsed = started.elapsed();
    Ok(report)
}
