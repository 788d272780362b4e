use std::env;
use std::sync::{Mutex, OnceLock};

use mendflow_cli::commands::{config, doctor, migrate, seed, smoke};
use serde_json::Value;

// One pooled connection keeps `sqlite::memory:` pointing at a single
// database for the whole command run.
const VALID_ENV: &[(&str, &str)] =
    &[("MENDFLOW_DATABASE_URL", "sqlite::memory:"), ("MENDFLOW_DATABASE_MAX_CONNECTIONS", "1")];

// Push enabled without a webhook url fails config validation.
const INVALID_ENV: &[(&str, &str)] = &[("MENDFLOW_PUSH_ENABLED", "true")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_when_push_misconfigured() {
    with_env(INVALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("push.webhook_url"), "message was: {message}");
    });
}

#[test]
fn seed_returns_deterministic_journey_summary() {
    with_env(VALID_ENV, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        let fresh_line = "  - fresh: req-demo-001 (Fresh submission awaiting HQ review)";
        let pending_line =
            "  - pending_decision: req-demo-002 (First estimate submitted, pending the HQ decision)";
        let resubmitted_line =
            "  - resubmitted: req-demo-003 (First estimate rejected, second approved, work under way)";
        let closed_line = "  - closed: req-demo-004 (Full journey closed out with a result comment)";
        assert!(message.contains(fresh_line), "message was: {message}");
        assert!(message.contains(pending_line), "message was: {message}");
        assert!(message.contains(resubmitted_line), "message was: {message}");
        assert!(message.contains(closed_line), "message was: {message}");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(VALID_ENV, || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["command"], "seed");
        assert_eq!(second_payload["status"], "ok");

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn smoke_returns_success_report_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");
        let checks = payload["checks"].as_array().map(Vec::len).unwrap_or(0);
        assert_eq!(checks, 5, "expected all five smoke checks to report");
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(INVALID_ENV, || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
    });
}

#[test]
fn doctor_skips_downstream_checks_when_config_invalid() {
    with_env(INVALID_ENV, || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        assert_eq!(checks.len(), 4);
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert_eq!(checks[1]["name"], "push_webhook_readiness");
        assert_eq!(checks[1]["status"], "skipped");
        assert_eq!(checks[2]["name"], "database_connectivity");
        assert_eq!(checks[2]["status"], "skipped");
        assert_eq!(checks[3]["name"], "outbox_backlog");
        assert_eq!(checks[3]["status"], "skipped");
    });
}

#[test]
fn doctor_points_unmigrated_databases_at_migrate() {
    with_env(VALID_ENV, || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");

        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        assert_eq!(checks[2]["name"], "database_connectivity");
        assert_eq!(checks[2]["status"], "pass");
        assert_eq!(checks[3]["name"], "outbox_backlog");
        assert_eq!(checks[3]["status"], "fail");
        let details = checks[3]["details"].as_str().unwrap_or("");
        assert!(details.contains("mendflow migrate"), "details were: {details}");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(VALID_ENV, || {
        let output = config::run();
        assert!(
            output.contains("- database.url = sqlite::memory: (source: env (MENDFLOW_DATABASE_URL))"),
            "output was: {output}"
        );
        assert!(output.contains("- push.enabled = false (source: default)"), "output was: {output}");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "MENDFLOW_DATABASE_URL",
        "MENDFLOW_DATABASE_MAX_CONNECTIONS",
        "MENDFLOW_DATABASE_TIMEOUT_SECS",
        "MENDFLOW_PUSH_ENABLED",
        "MENDFLOW_PUSH_WEBHOOK_URL",
        "MENDFLOW_PUSH_AUTH_TOKEN",
        "MENDFLOW_PUSH_POLL_INTERVAL_SECS",
        "MENDFLOW_PUSH_BATCH_SIZE",
        "MENDFLOW_ATTACHMENTS_PUBLIC_BASE_URL",
        "MENDFLOW_SERVER_BIND_ADDRESS",
        "MENDFLOW_SERVER_HEALTH_CHECK_PORT",
        "MENDFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "MENDFLOW_LOGGING_LEVEL",
        "MENDFLOW_LOGGING_FORMAT",
        "MENDFLOW_LOG_LEVEL",
        "MENDFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
