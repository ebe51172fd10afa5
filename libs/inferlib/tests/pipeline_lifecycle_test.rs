//! Pipeline Lifecycle Integration Test
//!
//! Verifies the definition lifecycle under concurrency:
//! 1. Waiters block until the definition becomes available
//! 2. A reload drains in-flight pipelines before committing new content
//! 3. The next request after a reload observes the new graph
//! 4. Failed reloads leave the definition unavailable
//! 5. Subscriptions follow the referenced models across reloads

use std::sync::Arc;
use std::time::{Duration, Instant};

use inferlib::{
    alias_map, insert_connection, AliasMapping, AvailabilityState, ConnectionMap,
    InferenceRequest, InferenceResponse, ModelConfig, ModelInstance, ModelManager, NodeInfo,
    PipelineDefinition, PipelineError, Precision, TensorInfo,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn tensor(name: &str, shape: &[u64], precision: Precision) -> TensorInfo {
    TensorInfo::new(name, shape.to_vec(), precision)
}

fn register_model(manager: &ModelManager, model: &str, input: &str, output: &str) {
    manager.register_instance(ModelInstance::new(
        model,
        1,
        vec![tensor(input, &[1, 10], Precision::Fp32)],
        vec![tensor(output, &[1, 10], Precision::Fp32)],
        ModelConfig::fixed(),
    ));
}

/// `request → node(model) → response` with the given tensor names.
fn graph(model: &str, input: &str, output: &str) -> (Vec<NodeInfo>, ConnectionMap) {
    let nodes = vec![
        NodeInfo::entry([input]),
        NodeInfo::dl("step", model, Some(1), alias_map([(output, output)])),
        NodeInfo::exit(),
    ];
    let mut connections = ConnectionMap::new();
    insert_connection(
        &mut connections,
        "step",
        "request",
        AliasMapping::new(input, input),
    );
    insert_connection(
        &mut connections,
        "response",
        "step",
        AliasMapping::new(output, output),
    );
    (nodes, connections)
}

fn wait_for_state(definition: &PipelineDefinition, state: AvailabilityState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while definition.state() != state {
        assert!(
            Instant::now() < deadline,
            "definition never reached {:?}",
            state
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn waiter_blocks_until_definition_available() {
    init_tracing();
    let manager = ModelManager::new();
    register_model(&manager, "m1", "a", "b");
    let (nodes, connections) = graph("m1", "a", "b");
    let definition = PipelineDefinition::new("p", nodes, connections);

    let waiter = Arc::clone(&definition);
    let handle = std::thread::spawn(move || waiter.wait_for_loaded(Duration::from_secs(5)));

    std::thread::sleep(Duration::from_millis(20));
    assert!(!handle.is_finished());

    definition.load(&manager).expect("valid pipeline");
    let guard = handle
        .join()
        .expect("waiter thread panicked")
        .expect("waiter got a guard");
    drop(guard);
}

#[test]
fn reload_drains_in_flight_pipelines_before_committing() {
    init_tracing();
    let manager = ModelManager::new();
    register_model(&manager, "m1", "a", "b");
    register_model(&manager, "m2", "x", "y");

    let (nodes, connections) = graph("m1", "a", "b");
    let definition = PipelineDefinition::new("p", nodes, connections);
    definition.load(&manager).expect("valid pipeline");

    // Request in flight: the pipeline holds the definition guard.
    let pipeline = definition
        .create(InferenceRequest::default(), InferenceResponse::new(), &manager)
        .expect("create");

    let reloader = Arc::clone(&definition);
    let reloader_manager = manager.clone();
    let handle = std::thread::spawn(move || {
        let (nodes, connections) = graph("m2", "x", "y");
        reloader.reload(&reloader_manager, nodes, connections)
    });

    // The reload transitions to loading, then blocks on the drain.
    wait_for_state(&definition, AvailabilityState::Loading);
    std::thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished(), "reload committed while a request was in flight");

    // Old content is still installed while the reload waits.
    let inputs = definition.get_inputs_info(&manager).expect("inputs info");
    assert!(inputs.contains_key("a"));

    // Finishing the request releases the guard; the reload commits.
    drop(pipeline);
    handle
        .join()
        .expect("reload thread panicked")
        .expect("reload succeeded");
    assert_eq!(definition.state(), AvailabilityState::Available);

    // The next request observes the new graph.
    let inputs = definition.get_inputs_info(&manager).expect("inputs info");
    assert!(inputs.contains_key("x"));
    assert!(!inputs.contains_key("a"));
    let pipeline = definition
        .create(InferenceRequest::default(), InferenceResponse::new(), &manager)
        .expect("create after reload");
    assert!(pipeline.node("step").is_some());
}

#[test]
fn failed_reload_keeps_definition_loading() {
    init_tracing();
    let manager = ModelManager::new();
    register_model(&manager, "m1", "a", "b");

    let (nodes, connections) = graph("m1", "a", "b");
    let definition = PipelineDefinition::new("p", nodes, connections);
    definition.load(&manager).expect("valid pipeline");

    let (nodes, connections) = graph("ghost", "a", "b");
    assert_eq!(
        definition.reload(&manager, nodes, connections),
        Err(PipelineError::NodeReferringToMissingModel)
    );
    assert_eq!(definition.state(), AvailabilityState::Loading);

    let err = definition
        .create(InferenceRequest::default(), InferenceResponse::new(), &manager)
        .unwrap_err();
    assert_eq!(err, PipelineError::NotLoadedYet);
}

#[test]
fn reload_moves_subscriptions_to_new_models() {
    init_tracing();
    let manager = ModelManager::new();
    register_model(&manager, "m1", "a", "b");
    register_model(&manager, "m2", "x", "y");

    let (nodes, connections) = graph("m1", "a", "b");
    let definition = PipelineDefinition::new("p", nodes, connections);
    definition.load(&manager).expect("valid pipeline");
    assert!(definition.subscriptions().contains(&("m1".to_string(), 1)));

    let m1 = manager.find_model_instance("m1", 1).expect("registered");
    let m2 = manager.find_model_instance("m2", 1).expect("registered");
    assert_eq!(m1.subscriber_count(), 1);
    assert_eq!(m2.subscriber_count(), 0);

    let (nodes, connections) = graph("m2", "x", "y");
    definition
        .reload(&manager, nodes, connections)
        .expect("reload succeeded");

    let subscriptions = definition.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert!(subscriptions.contains(&("m2".to_string(), 1)));
    assert_eq!(m1.subscriber_count(), 0);
    assert_eq!(m2.subscriber_count(), 1);
}

#[test]
fn retire_drains_in_flight_pipelines() {
    init_tracing();
    let manager = ModelManager::new();
    register_model(&manager, "m1", "a", "b");

    let (nodes, connections) = graph("m1", "a", "b");
    let definition = PipelineDefinition::new("p", nodes, connections);
    definition.load(&manager).expect("valid pipeline");

    let pipeline = definition
        .create(InferenceRequest::default(), InferenceResponse::new(), &manager)
        .expect("create");

    let retirer = Arc::clone(&definition);
    let retirer_manager = manager.clone();
    let handle = std::thread::spawn(move || retirer.retire(&retirer_manager));

    wait_for_state(&definition, AvailabilityState::Unloading);
    std::thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished(), "retire completed while a request was in flight");

    drop(pipeline);
    handle.join().expect("retire thread panicked");
    assert_eq!(definition.state(), AvailabilityState::Retired);

    let err = definition.wait_for_loaded(Duration::ZERO).unwrap_err();
    assert_eq!(err, PipelineError::NotLoadedAnymore);
}

#[test]
fn waiter_fails_when_definition_retires_mid_wait() {
    init_tracing();
    let manager = ModelManager::new();
    register_model(&manager, "m1", "a", "b");
    let (nodes, connections) = graph("m1", "a", "b");
    let definition = PipelineDefinition::new("p", nodes, connections);
    // Never loaded: the waiter sits in the loading wait.

    let waiter = Arc::clone(&definition);
    let handle = std::thread::spawn(move || waiter.wait_for_loaded(Duration::from_secs(5)));
    std::thread::sleep(Duration::from_millis(20));

    definition.retire(&manager);
    let err = handle.join().expect("waiter thread panicked").unwrap_err();
    assert_eq!(err, PipelineError::NotLoadedAnymore);
}

#[test]
fn concurrent_requests_all_materialize() {
    init_tracing();
    let manager = ModelManager::new();
    register_model(&manager, "m1", "a", "b");
    let (nodes, connections) = graph("m1", "a", "b");
    let definition = PipelineDefinition::new("p", nodes, connections);
    definition.load(&manager).expect("valid pipeline");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let definition = Arc::clone(&definition);
        let manager = manager.clone();
        handles.push(std::thread::spawn(move || {
            let pipeline = definition
                .create(InferenceRequest::default(), InferenceResponse::new(), &manager)
                .expect("create");
            assert_eq!(pipeline.node_count(), 3);
        }));
    }
    for handle in handles {
        handle.join().expect("request thread panicked");
    }

    // All guards released: a reload commits without waiting.
    let (nodes, connections) = graph("m1", "a", "b");
    definition
        .reload(&manager, nodes, connections)
        .expect("reload succeeded");
    assert_eq!(definition.state(), AvailabilityState::Available);
}
