//! Environment-driven configuration.
//!
//! Every knob has a `TOOLRUNNER_*` environment variable; `PORT` is also
//! honored for platform deployments. CLI flags override env values.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Server-wide execution mode, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Safe public demo: simulated jobs, no API key required.
    Demo,
    /// Runs the configured CLI tools as real subprocesses.
    Live,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Live => "live",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(Self::Demo),
            "live" => Ok(Self::Live),
            other => Err(format!("unknown mode: {other} (expected demo or live)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub mode: Mode,
    /// Shared secret gating /api/* in live mode. Empty means nothing is
    /// accepted in live mode.
    pub api_key: String,
    /// Directory that contains one subdirectory per tool.
    pub tools_root: PathBuf,
    /// Per-job sandbox directories are created under here.
    pub artifact_root: PathBuf,
    pub max_body_bytes: usize,
    /// Ceiling on concurrently queued + running jobs.
    pub max_running_jobs: usize,
    /// Finished jobs older than this are swept on inbound traffic.
    pub job_retention: Duration,
    /// Hard wall-clock ceiling for a live subprocess.
    pub job_timeout: Duration,
    pub rate_window: Duration,
    pub rate_get_max: usize,
    pub rate_post_max: usize,
    pub allowed_origins: Vec<String>,
}

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:8443",
    "https://localhost:8443",
    "http://localhost:8450",
    "https://localhost:8450",
];

impl Config {
    pub fn from_env() -> Self {
        let port = env_parse("PORT", env_parse("TOOLRUNNER_PORT", 8450));
        Self {
            host: env_parse("TOOLRUNNER_HOST", IpAddr::from([0, 0, 0, 0])),
            port,
            mode: env_parse("TOOLRUNNER_MODE", Mode::Demo),
            api_key: std::env::var("TOOLRUNNER_API_KEY")
                .unwrap_or_default()
                .trim()
                .to_string(),
            tools_root: PathBuf::from(env_str("TOOLS_ROOT", "./tools")),
            artifact_root: PathBuf::from(env_str(
                "TOOLRUNNER_ARTIFACT_ROOT",
                "/tmp/toolrunner-artifacts",
            )),
            max_body_bytes: env_parse("TOOLRUNNER_MAX_BODY_BYTES", 24_000),
            max_running_jobs: env_parse("TOOLRUNNER_MAX_RUNNING_JOBS", 2),
            job_retention: Duration::from_secs(env_parse("TOOLRUNNER_JOB_RETENTION_SEC", 3600)),
            job_timeout: Duration::from_secs(env_parse("TOOLRUNNER_JOB_TIMEOUT_SEC", 7200)),
            rate_window: Duration::from_secs(env_parse("TOOLRUNNER_RATE_WINDOW_SEC", 60)),
            rate_get_max: env_parse("TOOLRUNNER_RATE_GET_MAX", 120),
            rate_post_max: env_parse("TOOLRUNNER_RATE_POST_MAX", 10),
            allowed_origins: env_origins(),
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_origins() -> Vec<String> {
    match std::env::var("TOOLRUNNER_ALLOWED_ORIGINS") {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
    }
}
