// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::Config;

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn defaults_are_valid() -> anyhow::Result<()> {
    let config = parse(&["stepwise-gatewayd"]);
    config.validate()?;
    assert_eq!(config.port, 4500);
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.max_sessions, 16);
    assert_eq!(config.log_format, "json");
    Ok(())
}

#[test]
fn viewport_reads_both_dimensions() {
    let config = parse(&["stepwise-gatewayd", "--browser-viewport-width", "640", "--browser-viewport-height", "480"]);
    assert_eq!(config.viewport(), (640, 480));
}

#[test]
fn invalid_max_sessions_zero() {
    let config = parse(&["stepwise-gatewayd", "--max-sessions", "0"]);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("max-sessions"));
}

#[test]
fn invalid_screencast_quality_out_of_range() {
    let config = parse(&["stepwise-gatewayd", "--screencast-quality", "150"]);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("screencast-quality"));
}

#[test]
fn invalid_short_token_bytes() {
    let config = parse(&["stepwise-gatewayd", "--session-token-bytes", "4"]);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("session-token-bytes"));
}

#[test]
fn invalid_idle_timeout_below_sweep_interval() {
    let config = parse(&["stepwise-gatewayd", "--idle-timeout-ms", "1000"]);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("idle-timeout-ms"));
}

#[test]
fn invalid_log_format() {
    let config = parse(&["stepwise-gatewayd", "--log-format", "xml"]);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("log-format"));
}
