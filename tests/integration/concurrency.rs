//! Concurrency tests
//!
//! These tests verify shared state under concurrent use:
//! - Simultaneous starts on one service get distinct, pollable actions
//! - Completions racing with polls never expose a half-written result
//! - Registry replacement racing with collection

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use fleet_managed::actions::{ActionKind, Completion};
use fleet_managed::alerts::{AlertRegistry, IdAlert};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{http_action_service, single_agent_inventory};

#[tokio::test]
async fn test_concurrent_starts_get_distinct_actions() {
    let agent_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/actions/start"))
        .respond_with(ResponseTemplate::new(200))
        .expect(10)
        .mount(&agent_server)
        .await;

    let service = http_action_service(single_agent_inventory(Some(agent_server.uri())));

    let mut tasks = vec![];
    for i in 0..10 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .start_action(
                    "svc-mysql",
                    None,
                    ActionKind::MySqlQuerySelect {
                        query: format!("{i} AS n"),
                    },
                )
                .await
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        let started = task.await.unwrap().unwrap();
        assert_eq!(started.pmm_agent_id, "pmm-agent-1");
        assert!(ids.insert(started.action_id));
    }
    assert_eq!(service.store().len().await, 10);

    for (n, id) in ids.iter().enumerate() {
        service
            .report_completion(id, Completion::Output(n.to_string().into_bytes()))
            .await
            .unwrap();
    }
    for id in &ids {
        let result = service.get_action(id).await.unwrap();
        assert!(result.done);
        assert!(!result.output.is_empty());
    }
}

#[tokio::test]
async fn test_polls_see_pending_or_final() {
    let agent_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/actions/start"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&agent_server)
        .await;

    let service = http_action_service(single_agent_inventory(Some(agent_server.uri())));
    let started = service
        .start_action("svc-mysql", None, ActionKind::PtMySqlSummary { args: vec![] })
        .await
        .unwrap();

    let output = vec![b'x'; 64 * 1024];
    let poller = {
        let service = service.clone();
        let id = started.action_id.clone();
        let expected = output.clone();
        tokio::spawn(async move {
            loop {
                let result = service.get_action(&id).await.unwrap();
                if result.done {
                    assert_eq!(result.output, expected);
                    assert_eq!(result.error, "");
                    break;
                }
                assert!(result.output.is_empty());
                tokio::task::yield_now().await;
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    service
        .report_completion(&started.action_id, Completion::Output(output))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), poller)
        .await
        .expect("poller did not observe completion")
        .unwrap();
}

#[tokio::test]
async fn test_registry_replace_while_collecting() {
    let registry = AlertRegistry::new();

    let batch = |n: usize| -> Vec<IdAlert> {
        (0..n)
            .map(|i| IdAlert {
                id: format!("/stt/{i}"),
                alert: registry.create_alert(HashMap::new(), HashMap::new(), Duration::from_secs(60)),
            })
            .collect()
    };

    let writer = {
        let registry = registry.clone();
        let batches: Vec<_> = [3, 7, 5, 7, 3].into_iter().map(batch).collect();
        tokio::spawn(async move {
            for batch in batches {
                registry.set(batch).await;
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..5)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let len = registry.collect().await.len();
                    assert!([0, 3, 5, 7].contains(&len), "saw partial batch of {len}");
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(registry.len().await, 3);
}
