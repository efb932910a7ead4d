// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Browser-control gateway: owns a pool of headless browser sessions.
#[derive(Debug, Clone, Parser)]
#[command(name = "stepwise-gatewayd", version, about)]
pub struct Config {
    /// HTTP port to listen on.
    #[arg(long, env = "PORT", default_value = "4500")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Maximum number of concurrently live sessions.
    #[arg(long, env = "MAX_SESSIONS", default_value = "16")]
    pub max_sessions: usize,

    /// Idle timeout before a session is swept, in milliseconds.
    #[arg(long, env = "IDLE_TIMEOUT_MS", default_value = "1800000")]
    pub idle_timeout_ms: u64,

    /// Maximum number of steps retained per session before the oldest is dropped.
    #[arg(long, env = "MAX_STEPS_PER_SESSION", default_value = "500")]
    pub max_steps_per_session: usize,

    /// Browser viewport width in CSS pixels.
    #[arg(long, env = "BROWSER_VIEWPORT_WIDTH", default_value = "1280")]
    pub browser_viewport_width: u32,

    /// Browser viewport height in CSS pixels.
    #[arg(long, env = "BROWSER_VIEWPORT_HEIGHT", default_value = "800")]
    pub browser_viewport_height: u32,

    /// JPEG quality (0-100) used for screencast frames.
    #[arg(long, env = "SCREENCAST_QUALITY", default_value = "80")]
    pub screencast_quality: u8,

    /// Maximum screencast frame rate delivered to a client.
    #[arg(long, env = "SCREENCAST_MAX_FPS", default_value = "10")]
    pub screencast_max_fps: u32,

    /// Number of random bytes used to generate a session token.
    #[arg(long, env = "SESSION_TOKEN_BYTES", default_value = "32")]
    pub session_token_bytes: usize,

    /// Root directory under which per-session working directories are created.
    #[arg(long, env = "TEMP_DIR")]
    pub temp_dir: Option<std::path::PathBuf>,

    /// Log format (json or text).
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Time allowed to drain in-flight sessions on shutdown, in milliseconds.
    #[arg(long, env = "SHUTDOWN_DRAIN_TIMEOUT_MS", default_value = "10000")]
    pub shutdown_drain_timeout_ms: u64,

    /// Rate limiter: input bucket capacity.
    #[arg(long, env = "RATE_LIMIT_INPUT_CAPACITY", default_value = "120")]
    pub rate_limit_input_capacity: u32,

    /// Rate limiter: input bucket refill rate, tokens/sec.
    #[arg(long, env = "RATE_LIMIT_INPUT_REFILL", default_value = "60")]
    pub rate_limit_input_refill: u32,

    /// Rate limiter: navigation bucket capacity.
    #[arg(long, env = "RATE_LIMIT_NAV_CAPACITY", default_value = "10")]
    pub rate_limit_nav_capacity: u32,

    /// Rate limiter: navigation bucket refill rate, tokens/sec.
    #[arg(long, env = "RATE_LIMIT_NAV_REFILL", default_value = "2")]
    pub rate_limit_nav_refill: u32,
}

/// Interval between idle-session sweeps. Fixed by the design, not configurable.
pub const IDLE_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_sessions == 0 {
            anyhow::bail!("--max-sessions must be at least 1");
        }
        if self.max_steps_per_session == 0 {
            anyhow::bail!("--max-steps-per-session must be at least 1");
        }
        if self.screencast_max_fps == 0 {
            anyhow::bail!("--screencast-max-fps must be at least 1");
        }
        if self.screencast_quality > 100 {
            anyhow::bail!("--screencast-quality must be between 0 and 100");
        }
        if self.session_token_bytes < 16 {
            anyhow::bail!("--session-token-bytes must be at least 16 for an unguessable token");
        }
        if self.rate_limit_input_capacity == 0 || self.rate_limit_nav_capacity == 0 {
            anyhow::bail!("rate limiter capacities must be at least 1");
        }
        let idle_timeout = std::time::Duration::from_millis(self.idle_timeout_ms);
        if idle_timeout <= IDLE_SWEEP_INTERVAL {
            anyhow::bail!(
                "--idle-timeout-ms ({}) must exceed the {}s idle sweep interval or eviction \
                 never observes idleness",
                self.idle_timeout_ms,
                IDLE_SWEEP_INTERVAL.as_secs()
            );
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid --log-format: {other} (expected json or text)"),
        }
        Ok(())
    }

    /// The configured viewport as a (width, height) pair.
    pub fn viewport(&self) -> (u32, u32) {
        (self.browser_viewport_width, self.browser_viewport_height)
    }

    /// Resolve the temp root, falling back to the platform temp directory.
    pub fn temp_root(&self) -> std::path::PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn shutdown_drain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_drain_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
