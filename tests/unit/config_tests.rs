use std::time::Duration;

use mention_relay::config::{LlmProvider, QueueBackend};
use mention_relay::role::Role;
use mention_relay::{AppError, GlobalConfig};

const FULL_TOML: &str = r#"
database_path = "/tmp/relay/relay.db"
http_port = 9090
retention_days = 14

[slack]
acknowledge = true
acknowledgement_text = "{user} on it"
reply_in_thread = true

[queue]
endpoint = "http://elasticmq:9324/"
queue_name = "mentions"
dead_letter_queue_name = "mentions-dlq"
region = "ap-northeast-1"
wait_seconds = 5
visibility_timeout_seconds = 30
delay_seconds = 0
max_receive_count = 5
max_messages = 4

[llm]
provider = "gemini"
model = "gemini-1.5-pro"
max_tokens = 512
temperature = 0.2

[notion]
enabled = true
database_id = "db-123"
title_property = "Title"
status_property = "Status"
status_value = "Todo"
"#;

fn expect_config_error(raw: &str, needle: &str) {
    match GlobalConfig::from_toml_str(raw) {
        Err(AppError::Config(msg)) => assert!(msg.contains(needle), "unexpected message: {msg}"),
        other => panic!("expected config error containing {needle:?}, got {other:?}"),
    }
}

// ─── parsing ───────────────────────────────────────────────

#[test]
fn empty_file_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults parse");
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.retention_days, 30);
    assert!(!config.slack.acknowledge);
    assert!(!config.slack.reply_in_thread);
    assert_eq!(config.queue.backend, QueueBackend::Sqs);
    assert_eq!(config.queue.queue_name, "slack-mentions");
    assert_eq!(config.queue.region, "us-east-1");
    assert_eq!(config.queue.visibility_timeout(), Duration::from_secs(10));
    assert_eq!(config.queue.delay(), Duration::from_secs(5));
    assert_eq!(config.queue.max_receive_count, 3);
    assert_eq!(config.llm.provider, LlmProvider::Anthropic);
    assert!(!config.notion.enabled);
    assert_eq!(config.notion.title_property, "Name");
}

#[test]
fn full_file_overrides_every_section() {
    let config = GlobalConfig::from_toml_str(FULL_TOML).expect("full config parses");
    assert_eq!(config.http_port, 9090);
    assert_eq!(config.retention_days, 14);
    assert!(config.slack.acknowledge);
    assert_eq!(config.slack.acknowledgement_text, "{user} on it");
    assert_eq!(config.queue.wait(), Duration::from_secs(5));
    assert_eq!(config.queue.max_messages, 4);
    assert_eq!(config.llm.provider, LlmProvider::Gemini);
    assert_eq!(config.llm.max_tokens, 512);
    assert_eq!(config.notion.status_value.as_deref(), Some("Todo"));
}

#[test]
fn credentials_are_never_read_from_toml() {
    let raw = "[slack]\nbot_token = \"xoxb-leak\"\n";
    let config = GlobalConfig::from_toml_str(raw).expect("unknown-to-serde skip field ignored");
    assert!(config.slack.bot_token.is_empty());
}

// ─── queue urls ────────────────────────────────────────────

#[test]
fn queue_urls_follow_endpoint_layout() {
    let config = GlobalConfig::from_toml_str(FULL_TOML).expect("parse");
    assert_eq!(config.queue.queue_url(), "http://elasticmq:9324/queue/mentions");
    assert_eq!(
        config.queue.dead_letter_queue_url().as_deref(),
        Some("http://elasticmq:9324/queue/mentions-dlq")
    );
}

#[test]
fn explicit_queue_url_wins() {
    let raw = "[queue]\nqueue_url = \"https://sqs.us-east-1.amazonaws.com/1/m\"\n";
    let config = GlobalConfig::from_toml_str(raw).expect("parse");
    assert_eq!(config.queue.queue_url(), "https://sqs.us-east-1.amazonaws.com/1/m");
}

// ─── validation ────────────────────────────────────────────

#[test]
fn zero_max_receive_count_is_rejected() {
    expect_config_error("[queue]\nmax_receive_count = 0\n", "max_receive_count");
}

#[test]
fn long_poll_wait_above_twenty_is_rejected() {
    expect_config_error("[queue]\nwait_seconds = 21\n", "wait_seconds");
}

#[test]
fn zero_visibility_timeout_is_rejected() {
    expect_config_error("[queue]\nvisibility_timeout_seconds = 0\n", "visibility_timeout");
}

#[test]
fn max_messages_out_of_range_is_rejected() {
    expect_config_error("[queue]\nmax_messages = 11\n", "max_messages");
}

#[test]
fn empty_queue_name_is_rejected() {
    expect_config_error("[queue]\nqueue_name = \"\"\n", "queue_name");
}

#[test]
fn notion_without_database_is_rejected() {
    expect_config_error("[notion]\nenabled = true\n", "database_id");
}

#[test]
fn malformed_toml_is_a_config_error() {
    expect_config_error("http_port = \"eighty\"", "invalid config");
}

#[test]
fn memory_backend_requires_all_role() {
    let config = GlobalConfig::from_toml_str("[queue]\nbackend = \"memory\"\n").expect("parse");
    assert!(config.validate_for_role(Role::All).is_ok());
    assert!(matches!(
        config.validate_for_role(Role::Worker),
        Err(AppError::Config(_))
    ));
    assert!(matches!(
        config.validate_for_role(Role::Listener),
        Err(AppError::Config(_))
    ));
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, FULL_TOML).expect("write config");
    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.queue.queue_name, "mentions");
}

#[test]
fn load_from_missing_path_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(temp.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
