use mcp_orchestrator::config::AppConfig;
use mcp_orchestrator::mcp::TransportKind;
use serial_test::serial;
use std::env;
use std::fs;
use std::io::Write;

const ARGS: [&str; 1] = ["mcp-orchestrator"];

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("ORCH_SERVER__PORT");
        env::remove_var("ORCH_TIMEOUTS__INVOCATION_MS");
        env::remove_var("ORCH_WORKFLOW__MAX_TOOL_ITERATIONS");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
        env::remove_var("HOST");
        env::remove_var("MAX_TOOL_ITERATIONS");
        env::remove_var("ORCH_TEST_TOKEN");
        env::remove_var("ORCH_TEST_HOST");
    }
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config");
    file.write_all(content.as_bytes())
        .expect("Failed to write temp config");
    file
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load defaults");
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.workflow.max_tool_iterations, 10);
    assert_eq!(config.workflow.default_agent, "TriageAgent");
    assert!(config.tool_servers.is_empty());
    assert!(config.llm.is_none());

    // Built-in roster and rules fill in when nothing is configured.
    assert_eq!(config.agent_specs().len(), 5);
    assert_eq!(config.routing_rules().len(), 4);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("ORCH_SERVER__PORT", "9090");
        env::set_var("ORCH_TIMEOUTS__INVOCATION_MS", "1500");
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(
        config.engine_settings().invocation_timeout,
        std::time::Duration::from_millis(1500)
    );

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    clear_env_vars();
    unsafe {
        env::set_var("ORCH_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args(["mcp-orchestrator", "--port", "5050", "--max-tool-iterations", "3"])
        .expect("Failed to load config");
    assert_eq!(config.server.port, 5050);
    assert_eq!(config.workflow.max_tool_iterations, 3);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let file = write_config(
        r#"
server:
  port: 7070
tool_servers:
  - id: echo
    name: Echo Server
    url: http://localhost:5007
  - id: customer
    name: Customer Query
    url: http://localhost:5001/mcp
    type: http+streaming
routing:
  - keywords: [weather]
    agents: [TriageAgent]
"#,
    );
    unsafe {
        env::set_var("CONFIG_FILE", file.path());
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);

    let registry = config.registry().expect("registry");
    assert_eq!(registry.ids(), vec!["echo", "customer"]);
    assert_eq!(registry.get("echo").unwrap().transport, TransportKind::Http);
    assert_eq!(
        registry.get("customer").unwrap().transport,
        TransportKind::HttpStreaming
    );
    assert_eq!(config.routing_rules().len(), 1);

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env_vars();

    let result = AppConfig::load_from_args(["mcp-orchestrator", "--config", "/nonexistent/orch.yaml"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_placeholders_expanded() {
    clear_env_vars();
    unsafe {
        env::set_var("ORCH_TEST_HOST", "tools.internal:8443");
        env::set_var("ORCH_TEST_TOKEN", "s3cret");
    }

    let file = write_config(
        r#"
tool_servers:
  - id: secure
    name: Secure
    url: https://${ORCH_TEST_HOST}/mcp
    credential: ${ORCH_TEST_TOKEN}
  - id: unset
    name: Unset
    url: http://${ORCH_TEST_UNDEFINED}/x
"#,
    );
    unsafe {
        env::set_var("CONFIG_FILE", file.path());
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    let secure = &config.tool_servers[0];
    assert_eq!(secure.base_url, "https://tools.internal:8443/mcp");
    assert_eq!(secure.credential.as_deref(), Some("s3cret"));

    // Debug output never carries the credential.
    assert!(!format!("{secure:?}").contains("s3cret"));

    // Unknown variables are left as written.
    assert_eq!(config.tool_servers[1].base_url, "http://${ORCH_TEST_UNDEFINED}/x");

    clear_env_vars();
}

#[test]
#[serial]
fn test_duplicate_tool_server_ids_rejected() {
    clear_env_vars();

    let file = write_config(
        r"
tool_servers:
  - id: echo
    name: One
    url: http://localhost:1
  - id: echo
    name: Two
    url: http://localhost:2
",
    );
    unsafe {
        env::set_var("CONFIG_FILE", file.path());
    }

    let config = AppConfig::load_from_args(ARGS).expect("file itself is valid");
    let err = config.registry().unwrap_err();
    assert!(err.to_string().contains("echo"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    // Create ./config.yaml
    let config_content = r#"
server:
  port: 6060
    "#;
    let cwd_path = "config.yaml";
    fs::write(cwd_path, config_content).expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args(ARGS);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        assert_eq!(config.expect("Failed to load config").server.port, 6060);
    }));

    fs::remove_file(cwd_path).unwrap();

    if let Err(e) = result {
        std::panic::resume_unwind(e);
    }
}
