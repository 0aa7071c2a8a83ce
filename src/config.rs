//! Mission-level configuration: timings, scoring constants, and sync tolerances.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the library looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/mission.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "APOGEE_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared by every component of a mission node.
///
/// All scoring constants live here so a rules change (for example the disputed
/// crunch-landing penalty) is a configuration edit rather than a code change.
pub struct MissionConfig {
    /// Length of the BUILD phase countdown.
    pub build_duration: Duration,
    /// Remaining-time threshold below which the BUILD display raises its alert flag.
    pub build_alert_threshold: Duration,
    /// Total construction budget available to each team.
    pub total_budget: u32,
    /// Budget left is divided by this to obtain the budget bonus in seconds.
    pub budget_bonus_divisor: u32,
    /// Seconds credited when the rover objective is granted.
    pub rover_bonus_seconds: i64,
    /// Seconds credited when the return objective is granted.
    pub return_bonus_seconds: i64,
    /// Upper bound for the judge-assigned aesthetics bonus.
    pub aesthetics_bonus_max: u8,
    /// Seconds credited for a perfect soft landing.
    pub soft_landing_credit_seconds: i64,
    /// Seconds charged for a crunch landing.
    ///
    /// The judge console historically charged 45 while the report engine
    /// charged 20; the report value is the default because ranking consumes it.
    pub crunch_penalty_seconds: i64,
    /// Delay between a launch commit and the actual phase start.
    pub countdown_lead: Duration,
    /// How long the winner announcement stays masked before full reveal.
    pub reveal_hold: Duration,
    /// Interval between launch-sync probes from the director.
    pub probe_interval: Duration,
    /// Interval of the state-store poll backstop.
    pub poll_interval: Duration,
    /// Interval of the local display re-derivation tick.
    pub display_tick: Duration,
    /// Interval between store backend health checks.
    pub store_health_interval: Duration,
    /// First delay of the store connect/reconnect backoff.
    pub store_retry_initial: Duration,
    /// Upper bound of the store retry backoff.
    pub store_retry_max: Duration,
    /// Reconnect attempts after a failed health check before the backend is dropped.
    pub store_reconnect_attempts: u32,
    /// Clock offsets beyond this bound are clamped as implausible.
    pub max_clock_offset_ms: i64,
    /// A pending launch observed more than this early triggers a passive nudge.
    pub launch_early_tolerance_ms: i64,
    /// A pending launch observed more than this late triggers a passive nudge.
    pub launch_late_tolerance_ms: i64,
    /// Residual elapsed time at a phase start beyond which the offset is snapped.
    pub phase_residual_tolerance_ms: i64,
}

impl MissionConfig {
    /// Load the mission configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded mission config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse mission config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "mission config not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read mission config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            build_duration: Duration::from_secs(1_800),
            build_alert_threshold: Duration::from_secs(300),
            total_budget: 50_000,
            budget_bonus_divisor: 100,
            rover_bonus_seconds: 60,
            return_bonus_seconds: 100,
            aesthetics_bonus_max: 30,
            soft_landing_credit_seconds: 20,
            crunch_penalty_seconds: 20,
            countdown_lead: Duration::from_secs(3),
            reveal_hold: Duration::from_secs(5),
            probe_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            display_tick: Duration::from_secs(1),
            store_health_interval: Duration::from_secs(5),
            store_retry_initial: Duration::from_secs(1),
            store_retry_max: Duration::from_secs(10),
            store_reconnect_attempts: 3,
            max_clock_offset_ms: 60_000,
            launch_early_tolerance_ms: 5_000,
            launch_late_tolerance_ms: 1_000,
            phase_residual_tolerance_ms: 4_000,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file. Every field is optional so a
/// partial file only overrides what it names.
struct RawConfig {
    build_duration_seconds: Option<u64>,
    build_alert_seconds: Option<u64>,
    total_budget: Option<u32>,
    budget_bonus_divisor: Option<u32>,
    rover_bonus_seconds: Option<i64>,
    return_bonus_seconds: Option<i64>,
    aesthetics_bonus_max: Option<u8>,
    soft_landing_credit_seconds: Option<i64>,
    crunch_penalty_seconds: Option<i64>,
    countdown_lead_seconds: Option<u64>,
    reveal_hold_seconds: Option<u64>,
    probe_interval_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    display_tick_ms: Option<u64>,
    store_health_interval_ms: Option<u64>,
    store_retry_initial_ms: Option<u64>,
    store_retry_max_ms: Option<u64>,
    store_reconnect_attempts: Option<u32>,
    max_clock_offset_ms: Option<i64>,
    launch_early_tolerance_ms: Option<i64>,
    launch_late_tolerance_ms: Option<i64>,
    phase_residual_tolerance_ms: Option<i64>,
}

impl From<RawConfig> for MissionConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = MissionConfig::default();
        Self {
            build_duration: raw
                .build_duration_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.build_duration),
            build_alert_threshold: raw
                .build_alert_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.build_alert_threshold),
            total_budget: raw.total_budget.unwrap_or(defaults.total_budget),
            budget_bonus_divisor: raw
                .budget_bonus_divisor
                .unwrap_or(defaults.budget_bonus_divisor),
            rover_bonus_seconds: raw
                .rover_bonus_seconds
                .unwrap_or(defaults.rover_bonus_seconds),
            return_bonus_seconds: raw
                .return_bonus_seconds
                .unwrap_or(defaults.return_bonus_seconds),
            aesthetics_bonus_max: raw
                .aesthetics_bonus_max
                .unwrap_or(defaults.aesthetics_bonus_max),
            soft_landing_credit_seconds: raw
                .soft_landing_credit_seconds
                .unwrap_or(defaults.soft_landing_credit_seconds),
            crunch_penalty_seconds: raw
                .crunch_penalty_seconds
                .unwrap_or(defaults.crunch_penalty_seconds),
            countdown_lead: raw
                .countdown_lead_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.countdown_lead),
            reveal_hold: raw
                .reveal_hold_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.reveal_hold),
            probe_interval: raw
                .probe_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe_interval),
            poll_interval: raw
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            display_tick: raw
                .display_tick_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.display_tick),
            store_health_interval: raw
                .store_health_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_health_interval),
            store_retry_initial: raw
                .store_retry_initial_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_retry_initial),
            store_retry_max: raw
                .store_retry_max_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_retry_max),
            store_reconnect_attempts: raw
                .store_reconnect_attempts
                .unwrap_or(defaults.store_reconnect_attempts),
            max_clock_offset_ms: raw
                .max_clock_offset_ms
                .unwrap_or(defaults.max_clock_offset_ms),
            launch_early_tolerance_ms: raw
                .launch_early_tolerance_ms
                .unwrap_or(defaults.launch_early_tolerance_ms),
            launch_late_tolerance_ms: raw
                .launch_late_tolerance_ms
                .unwrap_or(defaults.launch_late_tolerance_ms),
            phase_residual_tolerance_ms: raw
                .phase_residual_tolerance_ms
                .unwrap_or(defaults.phase_residual_tolerance_ms),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
