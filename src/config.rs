//! Vigil configuration: transcript roots, CLI commands and tuned timings.

use crate::agent::Provider;
use std::path::PathBuf;
use std::time::Duration;

/// Delay before a finished tool is announced, so the UI doesn't flicker.
pub const TOOL_DONE_DELAY: Duration = Duration::from_millis(300);
/// How long a non-exempt tool may sit without transcript progress before
/// the agent is flagged as needing approval.
pub const PERMISSION_TIMER_DELAY: Duration = Duration::from_secs(7);
/// Idle time after a text-only answer before the turn is treated as over.
pub const TEXT_IDLE_DELAY: Duration = Duration::from_secs(5);
/// Poll fallback for filesystem notifications on a tailed transcript.
pub const TAIL_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Interval of the per-project scan for new transcript files.
pub const PROJECT_SCAN_INTERVAL: Duration = Duration::from_secs(1);
/// Interval at which a freshly spawned agent looks for its transcript.
pub const TRANSCRIPT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(1);
/// Time the CLI needs after launch before it accepts typed input.
pub const PROMPT_STARTUP_DELAY: Duration = Duration::from_secs(3);
/// Exits faster than this, with no transcript, count as startup failures.
pub const EARLY_EXIT_WINDOW: Duration = Duration::from_secs(5);

pub const BASH_COMMAND_DISPLAY_MAX: usize = 30;
pub const TASK_DESCRIPTION_DISPLAY_MAX: usize = 40;
/// Only this much of a codex transcript is read to find its session metadata.
pub const SESSION_META_PREFIX_BYTES: usize = 16 * 1024;

/// Environment variable forcing the provider for new agents.
pub const PROVIDER_ENV: &str = "VIGIL_PROVIDER";
pub const CLAUDE_DIR_ENV: &str = "VIGIL_CLAUDE_DIR";
pub const CODEX_DIR_ENV: &str = "VIGIL_CODEX_DIR";

/// Tuned delays and intervals. Tests shrink these; production uses `Default`.
#[derive(Debug, Clone)]
pub struct Timings {
    pub tool_done_delay: Duration,
    pub permission_delay: Duration,
    pub text_idle_delay: Duration,
    pub tail_poll_interval: Duration,
    pub project_scan_interval: Duration,
    pub discovery_interval: Duration,
    pub prompt_startup_delay: Duration,
    pub early_exit_window: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            tool_done_delay: TOOL_DONE_DELAY,
            permission_delay: PERMISSION_TIMER_DELAY,
            text_idle_delay: TEXT_IDLE_DELAY,
            tail_poll_interval: TAIL_POLL_INTERVAL,
            project_scan_interval: PROJECT_SCAN_INTERVAL,
            discovery_interval: TRANSCRIPT_DISCOVERY_INTERVAL,
            prompt_startup_delay: PROMPT_STARTUP_DELAY,
            early_exit_window: EARLY_EXIT_WINDOW,
        }
    }
}

/// Runtime config for the orchestrator.
#[derive(Debug, Clone)]
pub struct VigilConfig {
    /// Root of claude's per-project transcript directories.
    pub claude_projects_dir: PathBuf,
    /// Root of codex's `YYYY/MM/DD` session directories.
    pub codex_sessions_dir: PathBuf,
    /// Provider forced through the environment, if any.
    pub provider_override: Option<Provider>,
    /// Provider used when nothing else decides.
    pub default_provider: Provider,
    /// Working directory for agents spawned without one.
    pub default_workdir: PathBuf,
    pub timings: Timings,
}

impl Default for VigilConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            claude_projects_dir: home.join(".claude").join("projects"),
            codex_sessions_dir: home.join(".codex").join("sessions"),
            provider_override: None,
            default_provider: Provider::Claude,
            default_workdir: std::env::current_dir().unwrap_or(home),
            timings: Timings::default(),
        }
    }
}

impl VigilConfig {
    /// Defaults, with provider and root overrides read from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(PROVIDER_ENV) {
            match value.parse::<Provider>() {
                Ok(provider) => config.provider_override = Some(provider),
                Err(_) => tracing::warn!("Ignoring unknown {}={}", PROVIDER_ENV, value),
            }
        }
        if let Some(dir) = std::env::var_os(CLAUDE_DIR_ENV) {
            config.claude_projects_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os(CODEX_DIR_ENV) {
            config.codex_sessions_dir = PathBuf::from(dir);
        }

        config
    }

    /// Transcript root for a provider.
    pub fn transcript_root(&self, provider: Provider) -> &PathBuf {
        match provider {
            Provider::Claude => &self.claude_projects_dir,
            Provider::Codex => &self.codex_sessions_dir,
        }
    }
}
