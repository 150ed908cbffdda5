//! Tests for the pipeline execution engine.
//!
//! These tests use `MockService` and the in-memory `MemoryContext`, so no
//! real node implementation or external API is involved.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use nodes::mock::{MockService, Release};
use nodes::{Connection, MemoryContext, Node, NodeRunStatus, RetryConfig, ServiceRegistry};

use crate::{EngineConfig, PipelineEngine, RunStatus, CYCLE_FAILURE_KEY};

const MOCK: &str = "MOCK";

fn make_nodes(ids: &[&str]) -> Vec<Node> {
    ids.iter().map(|id| Node::new(*id, MOCK)).collect()
}

fn conn(from: &str, to: &str) -> Connection {
    Connection::new(from, to)
}

/// ids[0] → ids[1] → … → ids[n-1]
fn chain(ids: &[&str]) -> Vec<Connection> {
    ids.windows(2).map(|w| conn(w[0], w[1])).collect()
}

fn registry_of(services: &[Arc<MockService>]) -> Arc<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    for service in services {
        registry.register_service(service.clone());
    }
    Arc::new(registry)
}

fn build(
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    registry: Arc<ServiceRegistry>,
) -> (Arc<PipelineEngine>, Arc<MemoryContext>) {
    let store = Arc::new(MemoryContext::new(&nodes));
    let engine = PipelineEngine::new(nodes, connections, registry, store.clone());
    (Arc::new(engine), store)
}

async fn wait_for_status(engine: &PipelineEngine, node_id: &str, status: NodeRunStatus) {
    let mut rx = engine.subscribe();
    rx.wait_for(|state| state.node_status(node_id) == Some(status))
        .await
        .expect("engine dropped");
}

// ============================================================
// Layering and ordering
// ============================================================

#[tokio::test]
async fn empty_pipeline_completes_immediately() {
    let (engine, _) = build(vec![], vec![], registry_of(&[]));
    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.execution_order.is_empty());
    assert!(state.node_statuses.is_empty());
    assert!(state.started_at.is_some());
    assert!(state.completed_at.is_some());
}

#[tokio::test]
async fn linear_chain_runs_in_order() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let ids = ["a", "b", "c"];
    let (engine, _) = build(make_nodes(&ids), chain(&ids), registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.execution_order, vec!["a", "b", "c"]);
    assert_eq!(mock.calls(), vec!["a", "b", "c"]);
    assert_eq!(state.current_index, 2);
}

#[tokio::test]
async fn diamond_runs_siblings_in_the_middle_layer() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let nodes = make_nodes(&["A", "B", "C", "D"]);
    let connections = vec![conn("A", "B"), conn("A", "C"), conn("B", "D"), conn("C", "D")];
    let (engine, _) = build(nodes, connections, registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.execution_order[0], "A");
    let middle: HashSet<&str> = state.execution_order[1..3].iter().map(String::as_str).collect();
    assert_eq!(middle, HashSet::from(["B", "C"]));
    assert_eq!(state.execution_order[3], "D");
    assert_eq!(mock.call_count(), 4);
}

#[tokio::test]
async fn unconnected_nodes_share_a_layer_and_all_finish() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let (engine, _) = build(make_nodes(&["x", "y"]), vec![], registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.current_index, 0);
    assert_eq!(state.node_status("x"), Some(NodeRunStatus::Success));
    assert_eq!(state.node_status("y"), Some(NodeRunStatus::Success));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn connections_to_missing_nodes_are_ignored() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let connections = vec![conn("a", "b"), conn("a", "GHOST"), conn("PHANTOM", "b")];
    let (engine, _) = build(make_nodes(&["a", "b"]), connections, registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.execution_order, vec!["a", "b"]);
    assert!(state.failures.is_empty());
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn layer_siblings_execute_concurrently() {
    let release = Release::new();
    let slow = Arc::new(MockService::blocking(MOCK, release.clone()));
    let (engine, _) = build(make_nodes(&["left", "right"]), vec![], registry_of(&[slow.clone()]));

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });

    // Both siblings are inside `execute` at the same time.
    let mut rx = engine.subscribe();
    rx.wait_for(|s| s.count(NodeRunStatus::Running) == 2).await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(slow.call_count(), 2);

    release.open();
    let state = run.await.unwrap();
    assert_eq!(state.status, RunStatus::Completed);
}

// ============================================================
// Structural failures
// ============================================================

#[tokio::test]
async fn cycle_fails_the_run_without_executing_anything() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let nodes = make_nodes(&["A", "B", "C"]);
    let connections = vec![conn("A", "B"), conn("B", "C"), conn("C", "A")];
    let (engine, store) = build(nodes, connections, registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Error);
    let failure = &state.failures[CYCLE_FAILURE_KEY];
    assert!(failure.error.contains("cycle"));
    for id in ["A", "B", "C"] {
        assert!(failure.error.contains(id));
        assert_eq!(state.node_status(id), Some(NodeRunStatus::Pending));
        assert!(store.status_history(id).is_empty());
    }
    assert!(state.execution_order.is_empty());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn self_loop_is_never_executed() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let (engine, _) = build(make_nodes(&["A"]), vec![conn("A", "A")], registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Error);
    assert!(state.failures[CYCLE_FAILURE_KEY].error.contains('A'));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn cycle_anywhere_blocks_independent_nodes_too() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let nodes = make_nodes(&["solo", "a", "b"]);
    let connections = vec![conn("a", "b"), conn("b", "a")];
    let (engine, _) = build(nodes, connections, registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Error);
    assert_eq!(state.node_status("solo"), Some(NodeRunStatus::Pending));
    assert!(!state.failures[CYCLE_FAILURE_KEY].error.contains("solo"));
    assert_eq!(mock.call_count(), 0);
}

// ============================================================
// Node failures
// ============================================================

#[tokio::test]
async fn unregistered_type_fails_without_retry() {
    let nodes = vec![Node::new("a", "SCRIPT_PARSER")];
    let (engine, store) = build(nodes, vec![], registry_of(&[]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Error);
    assert_eq!(state.node_status("a"), Some(NodeRunStatus::Error));
    let failure = &state.failures["a"];
    assert!(failure.error.contains("SCRIPT_PARSER"));
    assert_eq!(failure.retry_count, 0);
    assert_eq!(store.status_history("a"), vec![NodeRunStatus::Error]);
}

#[tokio::test]
async fn failing_node_is_recorded() {
    let mock = Arc::new(MockService::succeeding(MOCK).failing_for(["b"]));
    let ids = ["a", "b"];
    let (engine, _) = build(make_nodes(&ids), chain(&ids), registry_of(&[mock]));

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Error);
    assert_eq!(state.node_status("a"), Some(NodeRunStatus::Success));
    assert_eq!(state.node_status("b"), Some(NodeRunStatus::Error));
    assert_eq!(state.failures["b"].error, "mock failure: b");
    assert!(!state.failures.contains_key("a"));
}

#[tokio::test]
async fn failure_does_not_stop_later_layers() {
    let ids: Vec<String> = (1..=20).map(|i| format!("n{i}")).collect();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let mock = Arc::new(MockService::succeeding(MOCK).failing_for(["n10"]));
    let (engine, _) = build(make_nodes(&ids), chain(&ids), registry_of(&[mock.clone()]));

    let state = engine.run().await;

    for id in &ids[..9] {
        assert_eq!(state.node_status(id), Some(NodeRunStatus::Success), "{id}");
    }
    assert_eq!(state.node_status("n10"), Some(NodeRunStatus::Error));
    for id in &ids[10..] {
        assert_eq!(state.node_status(id), Some(NodeRunStatus::Success), "{id}");
    }
    assert_eq!(state.status, RunStatus::Error);
    assert_eq!(mock.call_count(), 20);
}

#[tokio::test]
async fn failing_branch_does_not_affect_its_sibling() {
    let mock = Arc::new(MockService::succeeding(MOCK).failing_for(["B"]));
    let nodes = make_nodes(&["A", "B", "C", "D"]);
    let connections = vec![conn("A", "B"), conn("A", "C"), conn("B", "D"), conn("C", "D")];
    let (engine, _) = build(nodes, connections, registry_of(&[mock]));

    let state = engine.run().await;

    assert_eq!(state.node_status("B"), Some(NodeRunStatus::Error));
    assert_eq!(state.node_status("C"), Some(NodeRunStatus::Success));
    assert_eq!(state.node_status("D"), Some(NodeRunStatus::Success));
    assert_eq!(state.status, RunStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn service_retries_are_invisible_to_the_scheduler() {
    let retry = RetryConfig {
        max_retries: 2,
        backoff_ms: 10,
        backoff_multiplier: 2.0,
        pause_aware: true,
    };
    let mock = Arc::new(MockService::failing(MOCK, "render farm unavailable").with_retry(retry));
    let (engine, _) = build(make_nodes(&["a"]), vec![], registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(mock.call_count(), 3);
    assert_eq!(state.node_status("a"), Some(NodeRunStatus::Error));
    assert_eq!(state.failures["a"].error, "render farm unavailable");
    assert_eq!(state.failures["a"].retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn retry_override_replaces_service_config() {
    let mock = Arc::new(MockService::flaky(MOCK, 1));
    let nodes = make_nodes(&["a"]);
    let store = Arc::new(MemoryContext::new(&nodes));
    let config = EngineConfig {
        retry_override: Some(RetryConfig {
            max_retries: 1,
            backoff_ms: 5,
            ..RetryConfig::default()
        }),
    };
    let engine = PipelineEngine::new(nodes, vec![], registry_of(&[mock.clone()]), store)
        .with_config(config);

    let state = engine.run().await;

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn validation_rejection_skips_execution() {
    let mock = Arc::new(MockService::succeeding(MOCK).rejecting("script text is empty"));
    let (engine, _) = build(make_nodes(&["a"]), vec![], registry_of(&[mock.clone()]));

    let state = engine.run().await;

    assert_eq!(state.node_status("a"), Some(NodeRunStatus::Error));
    assert!(state.failures["a"].error.contains("script text is empty"));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn status_changes_reach_the_context() {
    let mock = Arc::new(MockService::succeeding(MOCK).failing_for(["b"]));
    let (engine, store) = build(make_nodes(&["a", "b"]), vec![], registry_of(&[mock]));

    engine.run().await;

    assert_eq!(
        store.status_history("a"),
        vec![NodeRunStatus::Running, NodeRunStatus::Success]
    );
    assert_eq!(
        store.status_history("b"),
        vec![NodeRunStatus::Running, NodeRunStatus::Error]
    );
}

// ============================================================
// Skip
// ============================================================

#[tokio::test]
async fn skip_only_applies_to_failed_nodes() {
    let mock = Arc::new(MockService::succeeding(MOCK).failing_for(["b"]));
    let ids = ["a", "b", "c"];
    let (engine, store) = build(make_nodes(&ids), chain(&ids), registry_of(&[mock]));

    let state = engine.run().await;
    assert_eq!(state.status, RunStatus::Error);

    assert!(!engine.skip_and_continue("a"));
    assert!(!engine.skip_and_continue("ghost"));

    assert!(engine.skip_and_continue("b"));
    let state = engine.get_state();
    assert_eq!(state.node_status("b"), Some(NodeRunStatus::Skipped));
    assert_eq!(store.status("b"), Some(NodeRunStatus::Skipped));
    // Skipped nodes do not count as errors.
    assert_eq!(state.status, RunStatus::Completed);

    assert!(!engine.skip_and_continue("b"));
    assert_eq!(engine.get_state(), state);
}

#[tokio::test]
async fn run_stays_failed_while_other_errors_remain() {
    let mock = Arc::new(MockService::succeeding(MOCK).failing_for(["a", "b"]));
    let (engine, _) = build(make_nodes(&["a", "b"]), vec![], registry_of(&[mock]));

    engine.run().await;
    assert!(engine.skip_and_continue("a"));
    assert_eq!(engine.get_state().status, RunStatus::Error);

    assert!(engine.skip_and_continue("b"));
    assert_eq!(engine.get_state().status, RunStatus::Completed);
}

#[tokio::test]
async fn skip_cannot_clear_a_cycle_failure() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let (engine, _) = build(make_nodes(&["a", "b"]), vec![conn("a", "b"), conn("b", "a")], registry_of(&[mock]));

    engine.run().await;

    assert!(!engine.skip_and_continue("a"));
    assert_eq!(engine.get_state().status, RunStatus::Error);
}

// ============================================================
// Pause / resume
// ============================================================

#[tokio::test(start_paused = true)]
async fn pause_holds_the_next_layer_until_resume() {
    let release = Release::new();
    let fast = Arc::new(MockService::succeeding(MOCK));
    let slow = Arc::new(MockService::blocking("SLOW", release.clone()));
    let nodes = vec![Node::new("a", MOCK), Node::new("b", "SLOW"), Node::new("c", MOCK)];
    let (engine, _) = build(nodes, vec![conn("a", "b"), conn("b", "c")], registry_of(&[fast.clone(), slow]));

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });

    wait_for_status(&engine, "b", NodeRunStatus::Running).await;
    assert!(engine.pause());
    assert_eq!(engine.get_state().status, RunStatus::Paused);
    assert!(engine.is_paused());

    // The in-flight attempt still finishes.
    release.open();
    wait_for_status(&engine, "b", NodeRunStatus::Success).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let state = engine.get_state();
    assert_eq!(state.status, RunStatus::Paused);
    assert_eq!(state.node_status("c"), Some(NodeRunStatus::Pending));
    assert_eq!(fast.calls(), vec!["a"]);

    assert!(engine.resume());
    assert_eq!(engine.get_state().status, RunStatus::Running);

    let state = run.await.unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.node_status("c"), Some(NodeRunStatus::Success));
    assert_eq!(fast.calls(), vec!["a", "c"]);
}

#[tokio::test(start_paused = true)]
async fn pause_during_last_layer_delays_completion() {
    let release = Release::new();
    let slow = Arc::new(MockService::blocking(MOCK, release.clone()));
    let (engine, _) = build(make_nodes(&["only"]), vec![], registry_of(&[slow]));

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });

    wait_for_status(&engine, "only", NodeRunStatus::Running).await;
    engine.pause();
    release.open();
    wait_for_status(&engine, "only", NodeRunStatus::Success).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.get_state().status, RunStatus::Paused);
    assert!(!run.is_finished());

    engine.resume();
    assert_eq!(run.await.unwrap().status, RunStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn skip_resumes_a_paused_run() {
    let release = Release::new();
    let failing = Arc::new(MockService::failing("FAIL", "bad upload"));
    let slow = Arc::new(MockService::blocking(MOCK, release.clone()));
    let nodes = vec![Node::new("bad", "FAIL"), Node::new("slow", MOCK), Node::new("tail", MOCK)];
    let connections = vec![conn("slow", "tail")];
    let (engine, _) = build(nodes, connections, registry_of(&[failing, slow]));

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });

    wait_for_status(&engine, "bad", NodeRunStatus::Error).await;
    wait_for_status(&engine, "slow", NodeRunStatus::Running).await;
    engine.pause();
    release.open();

    assert!(engine.skip_and_continue("bad"));
    assert_eq!(engine.get_state().node_status("bad"), Some(NodeRunStatus::Skipped));

    let state = run.await.unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.node_status("tail"), Some(NodeRunStatus::Success));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_pause_and_resume_keep_gate_and_status_in_step() {
    let release = Release::new();
    let slow = Arc::new(MockService::blocking(MOCK, release.clone()));
    let (engine, _) = build(make_nodes(&["only"]), vec![], registry_of(&[slow]));

    let run = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });
    wait_for_status(&engine, "only", NodeRunStatus::Running).await;

    for _ in 0..200 {
        let barrier = Barrier::new(2);
        std::thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                engine.pause();
            });
            s.spawn(|| {
                barrier.wait();
                engine.resume();
            });
        });
        let paused = engine.get_state().status == RunStatus::Paused;
        assert_eq!(engine.is_paused(), paused);
        engine.resume();
        assert!(!engine.is_paused());
    }

    release.open();
    let state = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run stuck behind a closed gate")
        .unwrap();
    assert_eq!(state.status, RunStatus::Completed);
}

#[tokio::test]
async fn pause_and_resume_outside_a_run_are_ignored() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let (engine, _) = build(make_nodes(&["a"]), vec![], registry_of(&[mock]));

    assert!(!engine.pause());
    assert!(!engine.resume());
    assert_eq!(engine.get_state().status, RunStatus::Idle);

    engine.run().await;
    assert!(!engine.pause());
    assert_eq!(engine.get_state().status, RunStatus::Completed);
}

// ============================================================
// State access
// ============================================================

#[tokio::test]
async fn get_state_returns_an_isolated_copy() {
    let mock = Arc::new(MockService::succeeding(MOCK).failing_for(["b"]));
    let (engine, _) = build(make_nodes(&["a", "b"]), vec![], registry_of(&[mock]));
    engine.run().await;

    let mut snapshot = engine.get_state();
    snapshot.status = RunStatus::Idle;
    snapshot.execution_order.clear();
    snapshot.node_statuses.insert("a".into(), NodeRunStatus::Error);
    snapshot.failures.get_mut("b").unwrap().error = "tampered".into();

    let fresh = engine.get_state();
    assert_eq!(fresh.status, RunStatus::Error);
    assert_eq!(fresh.execution_order.len(), 2);
    assert_eq!(fresh.node_status("a"), Some(NodeRunStatus::Success));
    assert_eq!(fresh.failures["b"].error, "mock failure: b");
}

#[tokio::test]
async fn subscribers_see_the_final_state() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let (engine, _) = build(make_nodes(&["a"]), vec![], registry_of(&[mock]));
    let mut rx = engine.subscribe();

    let final_state = engine.run().await;

    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), final_state);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let mock = Arc::new(MockService::succeeding(MOCK));
    let (engine, _) = build(make_nodes(&["a"]), vec![], registry_of(&[mock.clone()]));

    let first = engine.run().await;
    let second = engine.run().await;

    assert_eq!(first, second);
    assert_eq!(mock.call_count(), 1);
}
