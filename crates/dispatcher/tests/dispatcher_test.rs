#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use broker_core::config::{DispatcherConfig, SelectionStrategyKind};
    use broker_core::{Channel, RendezvousStep};
    use broker_dispatcher::Dispatcher;
    use broker_testing_utils::{
        off_duty_event, on_duty_event, order_event, ChannelCall, EventBuilder, Journal,
        ScriptedChannel, TestEnv, SPECIALTIES, STAFF_IDS,
    };
    use serde_json::json;

    fn provider(reply: serde_json::Value) -> Arc<ScriptedChannel> {
        ScriptedChannel::new(reply).shared()
    }

    #[tokio::test]
    async fn test_single_delivery() {
        let dispatcher = Dispatcher::default();
        let chef = provider(json!("baked-cake"));
        dispatcher
            .handle(on_duty_event("A", &["dessert"], chef.clone()))
            .await
            .unwrap();

        let order = provider(json!("cake"));
        dispatcher
            .handle(order_event("dessert", order.clone()))
            .await
            .unwrap();

        assert_eq!(chef.pushed(), vec![json!("cake")]);
        assert_eq!(chef.pull_count(), 1);
        assert_eq!(order.pushed(), vec![json!("baked-cake")]);
        assert_eq!(order.pull_count(), 1);
    }

    #[tokio::test]
    async fn test_multiple_deliveries_use_matching_provider() {
        let dispatcher = Dispatcher::default();
        let journal = Journal::new();

        for (id, specialty) in STAFF_IDS.iter().zip(SPECIALTIES) {
            let chef = ScriptedChannel::named(id, json!(format!("{specialty}-done")))
                .with_journal(&journal)
                .shared();
            dispatcher
                .handle(on_duty_event(id, &[specialty], chef))
                .await
                .unwrap();
        }

        let mut orders = Vec::new();
        for specialty in SPECIALTIES {
            let order = ScriptedChannel::new(json!(specialty)).shared();
            dispatcher
                .handle(order_event(specialty, order.clone()))
                .await
                .unwrap();
            orders.push((specialty, order));
        }

        for (specialty, order) in &orders {
            assert_eq!(order.pushed(), vec![json!(format!("{specialty}-done"))]);
        }
        let pushes = journal.pushes();
        assert_eq!(pushes.len(), 5);
        for ((owner, payload), (id, specialty)) in pushes.iter().zip(STAFF_IDS.iter().zip(SPECIALTIES)) {
            assert_eq!(owner.as_str(), *id);
            assert_eq!(payload, &json!(specialty));
        }
    }

    #[tokio::test]
    async fn test_uneven_specialties() {
        let dispatcher = Dispatcher::default();
        let b = ScriptedChannel::named("B", json!("from-b")).shared();
        let c = ScriptedChannel::named("C", json!("from-c")).shared();
        dispatcher
            .handle(on_duty_event("B", &["pasta"], b.clone()))
            .await
            .unwrap();
        dispatcher
            .handle(on_duty_event("C", &["meat", "dessert"], c.clone()))
            .await
            .unwrap();

        for (specialty, expected) in [("pasta", "from-b"), ("meat", "from-c"), ("dessert", "from-c")] {
            let order = ScriptedChannel::new(json!(specialty)).shared();
            dispatcher
                .handle(order_event(specialty, order.clone()))
                .await
                .unwrap();
            assert_eq!(order.pushed(), vec![json!(expected)]);
        }

        assert_eq!(b.pushed(), vec![json!("pasta")]);
        assert_eq!(c.pushed(), vec![json!("meat"), json!("dessert")]);
    }

    #[tokio::test]
    async fn test_order_waits_for_matching_provider() {
        let dispatcher = Dispatcher::default();
        let order = provider(json!("soup"));

        let pending = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let order = order.clone();
            async move { dispatcher.handle(order_event("vegetables", order)).await }
        });

        let registry = dispatcher.registry().clone();
        assert!(
            TestEnv::wait_for(|| registry.waiting_orders("vegetables") == 1, Duration::from_secs(2))
                .await
        );
        assert!(order.calls().is_empty());

        // 不匹配的服务者不会接手该订单
        let baker = provider(json!("bread"));
        dispatcher
            .handle(on_duty_event("baker", &["dessert"], baker.clone()))
            .await
            .unwrap();
        assert_eq!(registry.waiting_orders("vegetables"), 1);

        let cook = provider(json!("hot-soup"));
        dispatcher
            .handle(on_duty_event("cook", &["vegetables"], cook.clone()))
            .await
            .unwrap();

        pending.await.unwrap().unwrap();
        assert_eq!(order.pushed(), vec![json!("hot-soup")]);
        assert_eq!(cook.pushed(), vec![json!("soup")]);
        assert!(baker.calls().is_empty());
        assert_eq!(dispatcher.stats().orders_waited, 1);
        assert_eq!(registry.total_waiting_orders(), 0);
    }

    #[tokio::test]
    async fn test_registration_and_deregistration_leave_registry_empty() {
        let dispatcher = Dispatcher::default();

        for (id, specialty) in STAFF_IDS.iter().zip(SPECIALTIES) {
            dispatcher
                .handle(on_duty_event(id, &[specialty], provider(json!(null))))
                .await
                .unwrap();
        }
        assert_eq!(dispatcher.registry().len(), 5);

        dispatcher
            .handle(order_event("pasta", provider(json!("order"))))
            .await
            .unwrap();

        for id in STAFF_IDS {
            dispatcher.handle(off_duty_event(id)).await.unwrap();
        }
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_off_duty_for_unknown_id_succeeds() {
        let dispatcher = Dispatcher::default();
        dispatcher.handle(off_duty_event("nobody")).await.unwrap();
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_re_registration_overwrites() {
        let dispatcher = Dispatcher::default();
        let first = provider(json!("first"));
        let second = provider(json!("second"));
        dispatcher
            .handle(on_duty_event("A", &["pasta"], first.clone()))
            .await
            .unwrap();
        dispatcher
            .handle(on_duty_event("A", &["meat"], second.clone()))
            .await
            .unwrap();

        assert_eq!(dispatcher.registry().len(), 1);
        assert!(dispatcher.registry().candidates("pasta").is_empty());

        let order = provider(json!("steak"));
        dispatcher
            .handle(order_event("meat", order.clone()))
            .await
            .unwrap();
        assert_eq!(order.pushed(), vec![json!("second")]);
        assert!(first.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_events_are_rejected_without_side_effects() {
        let dispatcher = Dispatcher::default();
        let channel = provider(json!("payload"));
        let shared: Arc<dyn Channel> = channel.clone();

        let malformed = vec![
            EventBuilder::untyped().with_id("A").with_channel(shared.clone()).build(),
            EventBuilder::new("staff.onbreak").with_id("A").with_channel(shared.clone()).build(),
            EventBuilder::new("staff.onduty").with_specialties(&["pasta"]).build(),
            EventBuilder::new("staff.onduty").with_id("A").build(),
            EventBuilder::new("staff.onduty").with_id("A").with_specialties(&[]).build(),
            EventBuilder::new("staff.onduty").with_id("A").with_specialty("pasta").build(),
            EventBuilder::new("staff.onduty").with_id("A").with_specialties(&["pasta", ""]).build(),
            EventBuilder::new("staff.offduty").build(),
            EventBuilder::new("order").with_channel(shared.clone()).build(),
            EventBuilder::new("order")
                .with_specialties(&["pasta"])
                .with_channel(shared.clone())
                .build(),
        ];

        for event in malformed {
            let err = dispatcher.handle(event).await.unwrap_err();
            assert!(err.is_protocol(), "unexpected error: {err}");
        }

        assert!(dispatcher.registry().is_empty());
        assert_eq!(dispatcher.registry().total_waiting_orders(), 0);
        assert!(channel.calls().is_empty());
        assert_eq!(dispatcher.stats().registrations, 0);
    }

    #[tokio::test]
    async fn test_channel_failure_releases_provider() {
        let dispatcher = Dispatcher::default();
        let chef = provider(json!("risotto"));
        dispatcher
            .handle(on_duty_event("A", &["pasta"], chef.clone()))
            .await
            .unwrap();

        let broken = ScriptedChannel::new(json!("order")).failing_push("hung up").shared();
        let err = dispatcher
            .handle(order_event("pasta", broken.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.failed_step(), Some(RendezvousStep::PushOrder));
        assert!(dispatcher.registry().is_available("A"));

        let order = provider(json!("order"));
        dispatcher
            .handle(order_event("pasta", order.clone()))
            .await
            .unwrap();
        assert_eq!(order.pushed(), vec![json!("risotto")]);
        assert_eq!(chef.push_count(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_does_not_retry() {
        let dispatcher = Dispatcher::default();
        let chef = ScriptedChannel::new(json!("x")).failing_push("gone").shared();
        dispatcher
            .handle(on_duty_event("A", &["pasta"], chef.clone()))
            .await
            .unwrap();

        let order = provider(json!("order"));
        let err = dispatcher
            .handle(order_event("pasta", order.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.failed_step(), Some(RendezvousStep::PushProvider));
        assert_eq!(chef.calls(), vec![ChannelCall::Push(json!("order"))]);
        assert_eq!(order.calls(), vec![ChannelCall::Pull]);
    }

    #[tokio::test]
    async fn test_multi_specialty_provider_serves_each_tag() {
        for kind in [
            SelectionStrategyKind::RoundRobin,
            SelectionStrategyKind::Random,
            SelectionStrategyKind::LeastUsed,
            SelectionStrategyKind::Specialist,
        ] {
            let dispatcher = Dispatcher::new(DispatcherConfig::with_strategy(kind));
            let runner = ScriptedChannel::named("runner", json!("done")).shared();
            dispatcher
                .handle(on_duty_event("runner", &["non-food", "dessert"], runner.clone()))
                .await
                .unwrap();

            for specialty in ["non-food", "dessert"] {
                dispatcher
                    .handle(order_event(specialty, provider(json!(specialty))))
                    .await
                    .unwrap();
            }
            assert_eq!(runner.pushed(), vec![json!("non-food"), json!("dessert")]);
        }
    }

    #[tokio::test]
    async fn test_least_used_spreads_load() {
        let dispatcher =
            Dispatcher::new(DispatcherConfig::with_strategy(SelectionStrategyKind::LeastUsed));
        let first = provider(json!(1));
        let second = provider(json!(2));
        dispatcher
            .handle(on_duty_event("first", &["pasta"], first.clone()))
            .await
            .unwrap();
        dispatcher
            .handle(on_duty_event("second", &["pasta"], second.clone()))
            .await
            .unwrap();

        for _ in 0..4 {
            dispatcher
                .handle(order_event("pasta", provider(json!("order"))))
                .await
                .unwrap();
        }

        assert_eq!(first.push_count(), 2);
        assert_eq!(second.push_count(), 2);
    }
}
