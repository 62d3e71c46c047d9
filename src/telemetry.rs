use anyhow::{anyhow, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tracing::info;

fn build_recorder() -> PrometheusRecorder {
    PrometheusBuilder::new().build_recorder()
}

/// 安装全局指标记录器，返回的句柄用于渲染 Prometheus 文本
pub fn init_metrics() -> Result<PrometheusHandle> {
    let recorder = build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow!("安装指标记录器失败: {}", e))?;

    info!("指标记录器已初始化");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_dispatcher::DispatchStats;

    #[test]
    fn test_dispatch_counters_reach_recorder() {
        let recorder = build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let stats = DispatchStats::default();
            stats.record_registration();
            stats.record_completed();
            stats.record_completed();
            stats.record_timeout();
        });

        let rendered = handle.render();
        assert!(rendered.contains("broker_registrations_total 1"), "{rendered}");
        assert!(
            rendered.contains("broker_orders_total{outcome=\"completed\"} 2"),
            "{rendered}"
        );
        assert!(rendered.contains("broker_timeouts_total 1"), "{rendered}");
        assert!(!rendered.contains("broker_deregistrations_total 1"));
    }
}
