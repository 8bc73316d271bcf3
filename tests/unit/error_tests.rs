use mention_relay::AppError;

#[test]
fn display_prefixes_each_kind() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Db("x".into()), "db: x"),
        (AppError::Slack("x".into()), "slack: x"),
        (AppError::Queue("x".into()), "queue: x"),
        (AppError::Llm("x".into()), "llm: x"),
        (AppError::Notion("x".into()), "notion: x"),
        (AppError::Validation("x".into()), "validation: x"),
        (AppError::Decode("x".into()), "decode: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::InvalidTransition("x".into()), "invalid transition: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn only_decode_and_validation_are_permanent() {
    assert!(AppError::Decode("bad".into()).is_permanent());
    assert!(AppError::Validation("bad".into()).is_permanent());
    assert!(!AppError::Queue("down".into()).is_permanent());
    assert!(!AppError::Llm("timeout".into()).is_permanent());
    assert!(!AppError::Slack("rate limited".into()).is_permanent());
    assert!(!AppError::Db("locked".into()).is_permanent());
}

#[test]
fn json_errors_convert_to_decode() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{")
        .expect_err("invalid json")
        .into();
    assert!(matches!(err, AppError::Decode(_)));
}

#[test]
fn io_errors_convert_to_io() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("gone")));
}
