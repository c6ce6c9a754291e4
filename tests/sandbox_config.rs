//! 配置驱动的闸门测试

use relaycast::{load_config, Gate, GateDecision, GateRequest, GateRules, RetryPolicy};
use std::io::Write;
use std::time::Duration;

#[tokio::test]
async fn gate_built_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "step_logging:\n  enabled: true\n  level: trace\nretry:\n  max_failures: 4\n  backoff_ms: 20\n  backoff_multiplier: 3.0"
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert!(config.step_logging.enabled);

    let policy = RetryPolicy::from(&config.retry);
    assert_eq!(policy.max_failures, 4);
    assert_eq!(policy.backoff, Duration::from_millis(20));
    assert_eq!(policy.delay_for(1), Duration::from_millis(20));

    let level = config.step_logging.tracing_level().unwrap();
    let gate = Gate::new(GateRules::default(), Some(level)).unwrap();
    let decision = gate
        .decide(GateRequest::parse("GET /v1/models sk-1").unwrap())
        .await;
    assert!(matches!(decision, GateDecision::Forward { .. }));
}

#[test]
fn invalid_step_logging_level_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "step_logging:\n  level: loud").unwrap();
    assert!(load_config(file.path()).is_err());
}

#[tokio::test]
async fn empty_rules_fall_back_to_not_found() {
    let rules = GateRules {
        blocked_prefixes: Vec::new(),
        public_prefixes: vec!["/".to_string()],
        routes: Vec::new(),
    };
    let gate = Gate::new(rules, None).unwrap();
    let decision = gate.decide(GateRequest::new("GET", "/anything", None)).await;
    assert_eq!(decision, GateDecision::reject(404, "没有匹配的路由"));
}
