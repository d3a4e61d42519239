use super::*;
use serde_json::json;

#[test]
fn header_splits_on_first_equals() {
    assert_eq!(
        parse_header("Authorization=Basic YTpi=="),
        Ok(("Authorization".to_owned(), "Basic YTpi==".to_owned()))
    );
}

#[test]
fn header_without_equals_is_rejected() {
    assert!(parse_header("Authorization").is_err());
    assert!(parse_header("=value").is_err());
}

#[test]
fn params_are_optional_json() {
    assert_eq!(parse_params(None).expect("none"), None);
    assert_eq!(
        parse_params(Some(r#"{"id":7}"#)).expect("object"),
        Some(json!({"id": 7}))
    );
    assert!(matches!(parse_params(Some("{oops")), Err(CliError::InvalidJson(_))));
}

#[test]
fn cli_builds_client_config() {
    let cli = Cli::try_parse_from([
        "gns3-cli",
        "--url",
        "ws://10.0.0.5:3080/v3/ws",
        "--header",
        "X-Token=abc",
        "--protocol",
        "jsonrpc",
        "--heartbeat-secs",
        "15",
        "--timeout-secs",
        "3",
        "call",
        "vm.list",
    ])
    .expect("arguments should parse");

    let config = cli.client_config(ClientConfig::default());
    assert_eq!(config.url, "ws://10.0.0.5:3080/v3/ws");
    assert_eq!(config.headers, vec![("X-Token".to_owned(), "abc".to_owned())]);
    assert_eq!(config.protocols, vec!["jsonrpc".to_owned()]);
    assert_eq!(config.heartbeat, Some(Duration::from_secs(15)));
    assert_eq!(config.connect_timeout, Duration::from_secs(3));
    assert!(matches!(
        cli.command,
        Command::Call { ref method, params: None } if method == "vm.list"
    ));
}

#[test]
fn absent_flags_keep_environment_settings() {
    let cli = Cli::try_parse_from(["gns3-cli", "listen"]).expect("arguments should parse");
    let base = ClientConfig::new("ws://192.168.1.20:3080/")
        .with_heartbeat(Duration::from_secs(30))
        .with_connect_timeout(Duration::from_secs(4));

    assert_eq!(cli.client_config(base.clone()), base);
}

#[test]
fn zero_heartbeat_flag_overrides_environment() {
    let cli = Cli::try_parse_from(["gns3-cli", "--heartbeat-secs", "0", "listen"])
        .expect("arguments should parse");
    let base = ClientConfig::default().with_heartbeat(Duration::from_secs(30));

    assert_eq!(cli.client_config(base).heartbeat, None);
}
