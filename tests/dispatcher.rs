//! Integration tests for the Dispatcher and its aggregation groups

use std::{sync::Arc, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use herald::{
    engine::{Dispatcher, DispatcherMetrics, RouteTree, StaticLimits},
    models::{Alert, LabelSet, Route},
    persistence::MemoryGroupMarker,
    providers::MemoryAlertSource,
    test_helpers::{AlertBuilder, RecordingStage, RouteBuilder},
};
use tokio::{task::JoinHandle, time::sleep};

struct Harness {
    source: Arc<MemoryAlertSource>,
    stage: Arc<RecordingStage>,
    marker: Arc<MemoryGroupMarker>,
    metrics: DispatcherMetrics,
    dispatcher: Arc<Dispatcher>,
    handle: JoinHandle<()>,
}

impl Harness {
    fn start(route: Arc<Route>) -> Self {
        Self::start_with(route, |d| d)
    }

    fn start_with(route: Arc<Route>, configure: impl FnOnce(Dispatcher) -> Dispatcher) -> Self {
        Self::start_with_stage(route, RecordingStage::new(), configure)
    }

    fn start_with_stage(
        route: Arc<Route>,
        stage: RecordingStage,
        configure: impl FnOnce(Dispatcher) -> Dispatcher,
    ) -> Self {
        let source = Arc::new(MemoryAlertSource::new(64));
        let stage = Arc::new(stage);
        let marker = Arc::new(MemoryGroupMarker::new());
        let metrics = DispatcherMetrics::new().unwrap();

        let dispatcher = Arc::new(configure(Dispatcher::new(
            source.clone(),
            Arc::new(RouteTree::new(route)),
            stage.clone(),
            marker.clone(),
            metrics.clone(),
        )));

        let running = Arc::clone(&dispatcher);
        let handle = tokio::spawn(async move { running.run().await });

        Self { source, stage, marker, metrics, dispatcher, handle }
    }

    fn put(&self, alert: Alert) {
        self.source.put([alert]).unwrap();
    }

    async fn shutdown(self) {
        self.dispatcher.stop().await;
        self.handle.await.unwrap();
    }
}

fn instances(alerts: &[Alert]) -> Vec<&str> {
    alerts.iter().map(|a| a.labels.get("instance").unwrap_or_default()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_batches_alerts_of_a_group_in_order() {
    let route = RouteBuilder::new("r1")
        .group_by(&["alertname"])
        .group_wait(Duration::ZERO)
        .group_interval(Duration::from_secs(1))
        .build();
    let h = Harness::start(route);

    let a = AlertBuilder::new("Foo")
        .label("instance", "a")
        .ends_at(Utc::now() + ChronoDuration::hours(1))
        .build();
    h.put(a);
    sleep(Duration::from_millis(500)).await;

    let batches = h.stage.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(instances(&batches[0]), vec!["a"]);
    assert_eq!(batches[0][0].ends_at, None);

    h.put(AlertBuilder::new("Foo").label("instance", "b").build());
    sleep(Duration::from_millis(600)).await;

    let batches = h.stage.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(instances(&batches[1]), vec!["a", "b"]);

    let (ctx, _) = &h.stage.calls()[1];
    assert_eq!(ctx.receiver, "r1");
    assert_eq!(ctx.group_key, r#"{}:{alertname="Foo"}"#);
    assert_eq!(ctx.group_labels, LabelSet::from([("alertname", "Foo")]));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_first_flush_honours_group_wait() {
    let route = RouteBuilder::new("r1")
        .group_by(&["alertname"])
        .group_wait(Duration::from_secs(10))
        .group_interval(Duration::from_secs(60))
        .build();
    let h = Harness::start(route);

    h.put(AlertBuilder::new("Foo").build());
    sleep(Duration::from_secs(9)).await;
    assert!(h.stage.is_empty());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.stage.len(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_old_alert_is_flushed_immediately() {
    let route = RouteBuilder::new("r1")
        .group_by(&["alertname"])
        .group_wait(Duration::from_secs(30))
        .build();
    let h = Harness::start(route);

    h.put(AlertBuilder::new("Foo").starts_at(Utc::now() - ChronoDuration::minutes(10)).build());
    sleep(Duration::from_millis(10)).await;

    assert_eq!(h.stage.len(), 1);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_flushes_recur_every_group_interval() {
    let route = RouteBuilder::new("r1")
        .group_by(&["alertname"])
        .group_wait(Duration::ZERO)
        .group_interval(Duration::from_secs(5))
        .build();
    let h = Harness::start(route);

    h.put(AlertBuilder::new("Foo").build());
    sleep(Duration::from_secs(21)).await;

    // Flushes at 0s, 5s, 10s, 15s and 20s.
    assert_eq!(h.stage.len(), 5);
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_notification_is_retried_with_resolved_alerts() {
    let route = RouteBuilder::new("r1")
        .group_by(&["alertname"])
        .group_wait(Duration::ZERO)
        .group_interval(Duration::from_secs(1))
        .build();
    let h = Harness::start(route);
    h.stage.set_failing(true);

    h.put(
        AlertBuilder::new("Foo")
            .label("instance", "a")
            .ends_at(Utc::now() - ChronoDuration::minutes(1))
            .build(),
    );
    h.put(AlertBuilder::new("Foo").label("instance", "b").build());
    sleep(Duration::from_millis(500)).await;
    assert_eq!(h.stage.len(), 1);

    h.stage.set_failing(false);
    sleep(Duration::from_secs(1)).await;
    let batches = h.stage.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(instances(&batches[1]), vec!["a", "b"]);

    // The resolved alert was delivered and is gone from the group.
    sleep(Duration::from_secs(1)).await;
    let batches = h.stage.batches();
    assert_eq!(instances(&batches[2]), vec!["b"]);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_reclaims_resolved_groups() {
    let route = RouteBuilder::new("r1")
        .group_by(&["alertname"])
        .group_wait(Duration::ZERO)
        .group_interval(Duration::from_secs(1))
        .build();
    let h = Harness::start_with(route, |d| d.with_maintenance_interval(Duration::from_secs(10)));
    let group_key = r#"{}:{alertname="Foo"}"#;
    h.marker.set_muted("r1", group_key, vec!["weekends".into()]);

    h.put(AlertBuilder::new("Foo").ends_at(Utc::now() - ChronoDuration::minutes(1)).build());
    h.put(AlertBuilder::new("Bar").build());
    sleep(Duration::from_millis(500)).await;

    let stats = h.dispatcher.stats().await;
    assert_eq!(stats.total_groups, 2);
    assert_eq!(h.metrics.aggregation_groups.get(), 2);

    sleep(Duration::from_secs(10)).await;

    let stats = h.dispatcher.stats().await;
    assert_eq!(stats.total_groups, 1);
    assert_eq!(stats.groups_per_route.get("{}"), Some(&1));
    assert_eq!(h.metrics.aggregation_groups.get(), 1);
    assert_eq!(h.marker.muted("r1", group_key), None);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_group_limit_drops_new_groups() {
    let route = RouteBuilder::new("r1").group_by(&["alertname"]).build();
    let h = Harness::start_with(route, |d| d.with_limits(Arc::new(StaticLimits(2))));

    h.put(AlertBuilder::new("A").build());
    h.put(AlertBuilder::new("B").build());
    h.put(AlertBuilder::new("C").build());
    sleep(Duration::from_millis(10)).await;

    assert_eq!(h.dispatcher.stats().await.total_groups, 2);
    assert_eq!(h.metrics.aggregation_group_limit_reached.get(), 1);

    let (groups, _) = h.dispatcher.groups(|_| true, |_, _| true).await;
    let names: Vec<&str> = groups.iter().map(|g| g.alerts[0].name()).collect();
    assert_eq!(names, vec!["A", "B"]);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_groups_query() {
    let root = Route::from_config(herald::models::RouteConfig {
        receiver: Some("default".into()),
        group_by: Some(vec!["alertname".into()]),
        routes: vec![herald::models::RouteConfig {
            receiver: Some("pager".into()),
            matchers: vec!["severity=critical".parse().unwrap()],
            continue_matching: true,
            ..Default::default()
        }],
        ..Default::default()
    });
    let h = Harness::start(root);

    let critical = AlertBuilder::new("Foo").label("severity", "critical").build();
    h.put(critical.clone());
    h.put(AlertBuilder::new("Bar").build());
    sleep(Duration::from_millis(10)).await;

    let (groups, receivers) = h.dispatcher.groups(|_| true, |_, _| true).await;
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].labels, LabelSet::from([("alertname", "Bar")]));
    assert_eq!(groups[0].receiver, "default");
    assert_eq!(groups[1].receiver, "pager");
    assert_eq!(receivers[&critical.fingerprint()], vec!["pager"]);

    let (groups, receivers) = h.dispatcher.groups(|r| r.opts.receiver == "nobody", |_, _| true).await;
    assert!(groups.is_empty());
    assert!(receivers.is_empty());

    let (groups, _) = h
        .dispatcher
        .groups(|_| true, |alert, _| alert.labels.get("severity") == Some("critical"))
        .await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].alerts, vec![critical]);

    h.shutdown().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let route = RouteBuilder::new("r1").build();
    let h = Harness::start(route);
    h.put(AlertBuilder::new("Foo").build());
    sleep(Duration::from_millis(20)).await;

    h.dispatcher.stop().await;
    h.dispatcher.stop().await;

    tokio::time::timeout(Duration::from_secs(5), h.handle).await.unwrap().unwrap();
    assert_eq!(h.dispatcher.stats().await.total_groups, 0);
    assert_eq!(h.metrics.aggregation_groups.get(), 0);
}

#[tokio::test]
async fn test_run_ends_when_source_shuts_down() {
    let route = RouteBuilder::new("r1").build();
    let h = Harness::start(route);
    h.put(AlertBuilder::new("Foo").build());

    h.source.shutdown();
    tokio::time::timeout(Duration::from_secs(5), h.handle).await.unwrap().unwrap();
    h.dispatcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_notification_slower_than_group_interval_times_out() {
    let route = RouteBuilder::new("r1")
        .group_by(&["alertname"])
        .group_wait(Duration::ZERO)
        .group_interval(Duration::from_secs(1))
        .build();
    let h = Harness::start_with_stage(route, RecordingStage::with_delay(Duration::from_secs(5)), |d| d);

    h.put(AlertBuilder::new("Foo").ends_at(Utc::now() - ChronoDuration::minutes(1)).build());
    sleep(Duration::from_millis(3500)).await;

    // Every attempt is abandoned after one group interval and retried.
    assert!(h.stage.len() >= 3, "expected repeated attempts, got {}", h.stage.len());
    let (groups, _) = h.dispatcher.groups(|_| true, |_, _| true).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].alerts[0].name(), "Foo");

    h.shutdown().await;
}
