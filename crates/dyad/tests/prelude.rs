//! Integration test: the facade prelude covers a full round of use, and
//! agent state serializes for logging.

use std::sync::Arc;

use dyad::prelude::*;
use dyad_test_utils::{increment, Counter, HeartbeatProbe, ScriptedPolicy};

#[test]
fn prelude_drives_an_agent() {
    let env = Arc::new(
        Environment::new(EnvironmentConfig::default().with_component("counter", Counter::new()))
            .unwrap(),
    );
    let policy = ScriptedPolicy::new([increment("counter", 4), Decision::idle(2.0)]);
    let config = AgentConfig::new("a", policy, Arc::clone(&env))
        .with_component("probe", HeartbeatProbe::new());
    let mut agent = Agent::new(config).unwrap();
    agent.cycle();
    agent.cycle();
    assert_eq!(env.observe().unwrap().get("count"), Some(&Value::from(4)));
    assert_eq!(agent.metrics().idles, 1);
}

#[test]
fn agent_state_serializes_in_key_order() {
    let env = Arc::new(
        Environment::new(EnvironmentConfig::default().with_component("counter", Counter::new()))
            .unwrap(),
    );
    let policy = ScriptedPolicy::new([increment("counter", 1)]);
    let mut agent = Agent::new(AgentConfig::new("a", policy, env)).unwrap();
    agent.cycle();

    let json = serde_json::to_value(agent.state()).unwrap();
    let keys: Vec<&str> = json
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys[0], "agent/phase");
    assert!(keys.contains(&"environment/count"));
    assert_eq!(json["agent/action/args"]["by"], Value::from(1));

    let back: State = serde_json::from_value(json).unwrap();
    assert_eq!(&back, agent.state());
}

#[test]
fn requests_round_trip_through_json() {
    let request = ActionRequest::new(ActionId::agent("probe", "beats")).with_thoughts("curious");
    let text = serde_json::to_string(&request).unwrap();
    let back: ActionRequest = serde_json::from_str(&text).unwrap();
    assert_eq!(back, request);
}
