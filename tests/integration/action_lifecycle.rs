// Action dispatch against an HTTP agent, polling, completion and cancellation

use std::time::Duration;

use assert_matches::assert_matches;
use fleet_managed::actions::store::TIMED_OUT_ERROR;
use fleet_managed::actions::{ActionError, ActionKind, Completion, ErrorCode};
use fleet_managed::actors::janitor::JanitorHandle;
use fleet_managed::config::ActionsConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{MYSQL_DSN, agent, http_action_service, single_agent_inventory};

#[tokio::test]
async fn test_start_poll_complete() {
    let agent_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/actions/start"))
        .and(body_partial_json(json!({
            "kind": "mysql-explain",
            "query": "SELECT 1",
            "dsn": MYSQL_DSN,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&agent_server)
        .await;

    let service = http_action_service(single_agent_inventory(Some(agent_server.uri())));

    let started = service
        .start_action(
            "svc-mysql",
            None,
            ActionKind::MySqlExplain {
                query: "SELECT 1".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(started.pmm_agent_id, "pmm-agent-1");

    let pending = service.get_action(&started.action_id).await.unwrap();
    assert!(!pending.done);
    assert!(pending.output.is_empty());

    service
        .report_completion(&started.action_id, Completion::Output(b"plan".to_vec()))
        .await
        .unwrap();

    let done = service.get_action(&started.action_id).await.unwrap();
    assert!(done.done);
    assert_eq!(done.output, b"plan");
    assert_eq!(done.error, "");

    // a second report is rejected and leaves the result alone
    let err = service
        .report_completion(&started.action_id, Completion::Error("late".to_string()))
        .await
        .unwrap_err();
    assert_matches!(err, ActionError::AlreadyDone(_));
    assert_eq!(service.get_action(&started.action_id).await.unwrap(), done);
}

#[tokio::test]
async fn test_cancel_sends_stop_request() {
    let agent_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/actions/start"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&agent_server)
        .await;

    let service = http_action_service(single_agent_inventory(Some(agent_server.uri())));
    let started = service
        .start_action(
            "svc-mysql",
            Some("pmm-agent-1"),
            ActionKind::MySqlQueryShow {
                query: "VARIABLES".to_string(),
            },
        )
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/actions/stop"))
        .and(body_partial_json(json!({ "action_id": started.action_id })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&agent_server)
        .await;

    service.cancel_action(&started.action_id).await.unwrap();

    // cancelling only asks the agent; the result is still pending
    assert!(!service.get_action(&started.action_id).await.unwrap().done);
}

#[tokio::test]
async fn test_error_codes() {
    let agent_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&agent_server)
        .await;

    let mut inventory = single_agent_inventory(Some(agent_server.uri()));
    inventory.agents.push(agent("pmm-agent-2", "node-2", None));
    inventory.agents.push(agent("pmm-agent-3", "node-2", None));
    let service = http_action_service(inventory);

    let err = service.get_action("/action_id/missing").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = service.cancel_action("/action_id/missing").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = service
        .start_action(
            "svc-mysql",
            Some("pmm-agent-2"),
            ActionKind::PtMySqlSummary { args: vec![] },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ActionError::TargetNotFound { .. });
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);

    let err = service
        .start_action("node-2", None, ActionKind::PtSummary(Default::default()))
        .await
        .unwrap_err();
    assert_matches!(err, ActionError::AmbiguousTarget { candidates: 2, .. });
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);

    let err = service
        .start_action("svc-unknown", None, ActionKind::PostgreSqlQueryShow)
        .await
        .unwrap_err();
    assert_matches!(err, ActionError::AmbiguousTarget { candidates: 0, .. });

    let mut no_exporter = single_agent_inventory(None);
    no_exporter.exporters.clear();
    let err = http_action_service(no_exporter)
        .start_action("svc-mysql", None, ActionKind::MySqlQuerySelect { query: "1".to_string() })
        .await
        .unwrap_err();
    assert_matches!(err, ActionError::UnsupportedOrAmbiguousExporter { found: 0, .. });
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);

    // nothing was stored or sent for rejected actions
    assert!(service.store().is_empty().await);
}

#[tokio::test]
async fn test_unreachable_agent_is_internal() {
    let agent_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/actions/start"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&agent_server)
        .await;

    let service = http_action_service(single_agent_inventory(Some(agent_server.uri())));

    let err = service
        .start_action("svc-mysql", None, ActionKind::PtMySqlSummary { args: vec![] })
        .await
        .unwrap_err();
    assert_matches!(err, ActionError::Transport(_));
    assert_eq!(err.code(), ErrorCode::Internal);

    // the failure is recorded on the stored result
    assert_eq!(service.store().len().await, 1);
}

#[tokio::test]
async fn test_janitor_times_out_abandoned_actions() {
    let agent_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/actions/start"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&agent_server)
        .await;

    let service = http_action_service(single_agent_inventory(Some(agent_server.uri())));
    let started = service
        .start_action("node-1", None, ActionKind::PtSummary(Default::default()))
        .await
        .unwrap();

    let config = ActionsConfig {
        pending_timeout: 0,
        retention: 3600,
        sweep_interval: 3600,
        ..Default::default()
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let janitor = JanitorHandle::spawn(service.store().clone(), &config);
    janitor.sweep_now().await.unwrap();

    let result = service.get_action(&started.action_id).await.unwrap();
    assert!(result.done);
    assert_eq!(result.error, TIMED_OUT_ERROR);

    // the agent reporting afterwards does not resurrect it
    let err = service
        .report_completion(&started.action_id, Completion::Output(b"late".to_vec()))
        .await
        .unwrap_err();
    assert_matches!(err, ActionError::AlreadyDone(_));

    janitor.shutdown().await.unwrap();
}
