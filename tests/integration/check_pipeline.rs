// Checks file → executor → query actions → registry → Alertmanager

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_managed::actions::{ActionService, ResultStore, StaticInventory};
use fleet_managed::actors::executor::{ActionRowSource, CheckExecutor, ExecutorHandle};
use fleet_managed::actors::fetcher::{ActiveChecks, ChecksFetcher, FetcherHandle};
use fleet_managed::actors::messages::RunSummary;
use fleet_managed::actors::pusher::PusherHandle;
use fleet_managed::alerts::{AlertRegistry, AlertmanagerSink};
use fleet_managed::checks::{CheckRunner, FuncRegistry, Interval, PrivateNetworks};
use fleet_managed::config::{ChecksConfig, IntervalsConfig};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{AnsweringAgent, agent, mysql_exporter, target};

const BUNDLE: &str = r#"
checks:
  - version: 1
    name: mysql_version
    summary: MySQL version check
    type: mysql_select
    query: VERSION() AS version
    script: |
      fn check(rows) {
        let v = parse_version(rows[0].version);
        if v.num < 80000 {
          return [#{
            summary: "MySQL " + format_version(v) + " is outdated",
            description: "Upgrade to 8.0",
            severity: "warning",
            labels: #{ version: rows[0].version }
          }];
        }
        []
      }
  - version: 1
    name: mysql_private_host
    type: mysql_select
    query: "@@hostname AS host"
    interval: frequent
    script: |
      fn check(rows) { [] }
"#;

struct Pipeline {
    _checks_file: tempfile::NamedTempFile,
    fetcher: FetcherHandle,
    executor: ExecutorHandle,
    registry: AlertRegistry,
}

async fn pipeline() -> Pipeline {
    let mut checks_file = tempfile::NamedTempFile::new().unwrap();
    checks_file.write_all(BUNDLE.as_bytes()).unwrap();

    let config = ChecksConfig {
        file: Some(checks_file.path().to_path_buf()),
        fetch_interval: 3600,
        ..Default::default()
    };
    let fetcher = ChecksFetcher::new(&config, ActiveChecks::new()).unwrap();
    let checks = fetcher.checks().clone();
    let fetcher = FetcherHandle::spawn(fetcher, Duration::from_secs(config.fetch_interval));
    assert_eq!(fetcher.fetch_now().await.unwrap(), 2);

    let inventory = StaticInventory {
        agents: vec![agent("pmm-agent-1", "node-1", None)],
        targets: vec![
            target("svc-old", "pmm-agent-1"),
            target("svc-new", "pmm-agent-1"),
            target("svc-down", "pmm-agent-1"),
        ],
        exporters: vec![
            mysql_exporter("svc-old", "pmm-agent-1"),
            mysql_exporter("svc-new", "pmm-agent-1"),
            mysql_exporter("svc-down", "pmm-agent-1"),
        ],
    };

    let store = ResultStore::new();
    let answering = AnsweringAgent::new(
        store.clone(),
        HashMap::from([
            ("svc-old".to_string(), json!([{ "version": "5.7.30-33" }])),
            ("svc-new".to_string(), json!({ "version": "8.0.19" })),
        ]),
    );
    let actions = ActionService::new(Arc::new(inventory.clone()), Arc::new(answering), store);
    let rows = ActionRowSource::new(actions, Duration::from_secs(5), Duration::from_millis(10));

    let registry = AlertRegistry::new();
    let executor = CheckExecutor::new(
        checks,
        Arc::new(inventory),
        Arc::new(rows),
        CheckRunner::new(FuncRegistry::new(Arc::new(PrivateNetworks::new()))),
        registry.clone(),
        IntervalsConfig::default(),
    );
    let executor = ExecutorHandle::spawn(executor, Duration::from_secs(3600));

    Pipeline {
        _checks_file: checks_file,
        fetcher,
        executor,
        registry,
    }
}

#[tokio::test]
async fn test_outdated_service_raises_alert() {
    let pipeline = pipeline().await;

    let summary = pipeline.executor.run_now(Interval::Standard).await.unwrap();
    assert_eq!(summary, RunSummary { checks: 1, results: 1 });

    let alerts = pipeline.registry.collect().await;
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.labels["alertname"], "mysql_version");
    assert_eq!(alert.labels["service_id"], "svc-old");
    assert_eq!(alert.labels["service_name"], "svc-old-name");
    assert_eq!(alert.labels["severity"], "warning");
    assert_eq!(alert.labels["stt_check"], "1");
    assert_eq!(alert.labels["version"], "5.7.30-33");
    assert_eq!(alert.labels["environment"], "prod");
    assert_eq!(alert.annotations["summary"], "MySQL 5.7.30-33 is outdated");
    assert_eq!(alert.annotations["description"], "Upgrade to 8.0");

    // a check class with nothing to report keeps the other class's alerts
    let summary = pipeline.executor.run_now(Interval::Frequent).await.unwrap();
    assert_eq!(summary, RunSummary { checks: 1, results: 0 });
    assert_eq!(pipeline.registry.len().await, 1);

    // no checks of this class are active
    let summary = pipeline.executor.run_now(Interval::Rare).await.unwrap();
    assert_eq!(summary, RunSummary::default());

    pipeline.executor.shutdown().await.unwrap();
    pipeline.fetcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_alerts_reach_alertmanager() {
    let alertmanager = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&alertmanager)
        .await;

    let pipeline = pipeline().await;
    pipeline.executor.run_now(Interval::Standard).await.unwrap();
    let checked_at = Utc::now();

    let sink = AlertmanagerSink::new(&alertmanager.uri(), Duration::from_secs(2)).unwrap();
    let pusher = PusherHandle::spawn(
        pipeline.registry.clone(),
        Arc::new(sink),
        Duration::from_secs(3600),
    );
    assert_eq!(pusher.push_now().await.unwrap(), 1);

    let requests = alertmanager.received_requests().await.unwrap();
    let body: Vec<Value> = requests.last().unwrap().body_json().unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["labels"]["alertname"], "mysql_version");
    assert_eq!(body[0]["annotations"]["summary"], "MySQL 5.7.30-33 is outdated");

    // alerts stay valid for three resend intervals of their class
    let ends_at: DateTime<Utc> = body[0]["endsAt"].as_str().unwrap().parse().unwrap();
    let ttl = ends_at - checked_at;
    assert!(ttl <= chrono::Duration::days(3));
    assert!(ttl > chrono::Duration::days(3) - chrono::Duration::minutes(1));

    pusher.shutdown().await.unwrap();
    pipeline.executor.shutdown().await.unwrap();
    pipeline.fetcher.shutdown().await.unwrap();
}
