//! Credential loading from environment variables.
//!
//! The test environment has no keychain entries for the `mention-relay`
//! service, so every lookup falls through to the env var. These tests
//! mutate process-global env vars and run serially.

use mention_relay::role::Role;
use mention_relay::{AppError, GlobalConfig};

const ALL_VARS: [&str; 7] = [
    "SLACK_APP_TOKEN",
    "SLACK_BOT_TOKEN",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "NOTION_API_KEY",
];

#[allow(unsafe_code)]
fn set(vars: &[(&str, &str)]) {
    unsafe {
        for name in ALL_VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
    }
}

#[allow(unsafe_code)]
fn clear() {
    unsafe {
        for name in ALL_VARS {
            std::env::remove_var(name);
        }
    }
}

fn config(raw: &str) -> GlobalConfig {
    GlobalConfig::from_toml_str(raw).expect("config parses")
}

#[tokio::test]
#[serial_test::serial]
async fn all_role_with_sqs_loads_every_credential() {
    set(&[
        ("SLACK_APP_TOKEN", "xapp-1"),
        ("SLACK_BOT_TOKEN", "xoxb-1"),
        ("AWS_ACCESS_KEY_ID", "AKIA"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
    ]);
    let mut config = config("");

    config.load_credentials(Role::All).await.expect("credentials load");

    assert_eq!(config.slack.app_token, "xapp-1");
    assert_eq!(config.slack.bot_token, "xoxb-1");
    assert_eq!(config.queue.access_key_id, "AKIA");
    assert_eq!(config.queue.secret_access_key, "secret");
    assert_eq!(config.llm.api_key, "sk-ant");
    assert!(config.notion.api_key.is_empty());
    clear();
}

#[tokio::test]
#[serial_test::serial]
async fn worker_does_not_need_app_token() {
    set(&[
        ("SLACK_BOT_TOKEN", "xoxb-1"),
        ("AWS_ACCESS_KEY_ID", "AKIA"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
        ("GEMINI_API_KEY", "gm-key"),
    ]);
    let mut config = config("[llm]\nprovider = \"gemini\"\n");

    config.load_credentials(Role::Worker).await.expect("credentials load");

    assert!(config.slack.app_token.is_empty());
    assert_eq!(config.llm.api_key, "gm-key");
    clear();
}

#[tokio::test]
#[serial_test::serial]
async fn listener_does_not_need_llm_key() {
    set(&[
        ("SLACK_APP_TOKEN", "xapp-1"),
        ("SLACK_BOT_TOKEN", "xoxb-1"),
        ("AWS_ACCESS_KEY_ID", "AKIA"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
    ]);
    let mut config = config("");

    config.load_credentials(Role::Listener).await.expect("credentials load");
    assert!(config.llm.api_key.is_empty());
    clear();
}

#[tokio::test]
#[serial_test::serial]
async fn memory_backend_skips_aws_keys() {
    set(&[
        ("SLACK_APP_TOKEN", "xapp-1"),
        ("SLACK_BOT_TOKEN", "xoxb-1"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
    ]);
    let mut config = config("[queue]\nbackend = \"memory\"\n");

    config.load_credentials(Role::All).await.expect("credentials load");
    assert!(config.queue.access_key_id.is_empty());
    clear();
}

#[tokio::test]
#[serial_test::serial]
async fn enabled_notion_requires_its_key() {
    set(&[
        ("SLACK_APP_TOKEN", "xapp-1"),
        ("SLACK_BOT_TOKEN", "xoxb-1"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
    ]);
    let mut config = config(
        "[queue]\nbackend = \"memory\"\n[notion]\nenabled = true\ndatabase_id = \"db\"\n",
    );

    let err = config
        .load_credentials(Role::All)
        .await
        .expect_err("missing notion key");
    assert!(err.to_string().contains("NOTION_API_KEY"), "got: {err}");
    clear();
}

#[tokio::test]
#[serial_test::serial]
async fn missing_bot_token_names_the_env_var() {
    clear();
    let mut config = config("");

    let err = config
        .load_credentials(Role::Worker)
        .await
        .expect_err("missing bot token");
    match err {
        AppError::Config(msg) => {
            assert!(msg.contains("slack_bot_token"), "got: {msg}");
            assert!(msg.contains("SLACK_BOT_TOKEN"), "got: {msg}");
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[tokio::test]
#[serial_test::serial]
async fn blank_env_var_counts_as_missing() {
    set(&[("SLACK_BOT_TOKEN", "   ")]);
    let mut config = config("");

    let result = config.load_credentials(Role::Worker).await;
    assert!(matches!(result, Err(AppError::Config(_))));
    clear();
}
