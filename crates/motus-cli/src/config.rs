//! Configuration Vault – reads/writes `~/.motus/config.toml`.

use motus_hal::sim::{GRIPPER_FINGERS, LEFT_WHEEL, RIGHT_WHEEL, UR10E_JOINTS};
use motus_hal::{DeviceManifest, sim::POSITION_SENSOR_SUFFIX};
use motus_runtime::translator::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use motus_runtime::{DriverConfig, ExpanderConfig, MotionProfile, SchedulerConfig, TranslatorConfig};
use motus_types::MotusError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Id of the simulated fingertip touch sensor.
pub const TOUCH_SENSOR: &str = "touch_sensor";

/// Persisted user configuration stored in `~/.motus/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible chat endpoint.
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    /// Model name (e.g. "gpt-4o-mini", "llama3").
    #[serde(default = "default_model")]
    pub model: String,

    /// API key for the endpoint (stored as plain text; the file is written
    /// owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Seconds before a translation request is abandoned.
    #[serde(default = "default_translate_timeout_secs")]
    pub translate_timeout_secs: u64,

    /// Simulation timestep in milliseconds.
    #[serde(default = "default_timestep_ms")]
    pub timestep_ms: u64,

    /// Default motion timings for expanded plans.
    #[serde(default)]
    pub profile: MotionProfile,

    /// Pace the simulation to wall-clock time.
    #[serde(default = "default_realtime")]
    pub realtime: bool,

    /// Finger position (rad) at which the simulated touch sensor fires.
    /// No touch sensor is fitted when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_at: Option<f64>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("llm_url", &self.llm_url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("translate_timeout_secs", &self.translate_timeout_secs)
            .field("timestep_ms", &self.timestep_ms)
            .field("profile", &self.profile)
            .field("realtime", &self.realtime)
            .field("contact_at", &self.contact_at)
            .finish()
    }
}

impl Config {
    /// Reject values the simulation and translator cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.timestep_ms == 0 {
            return Err("timestep_ms must be greater than 0".to_string());
        }
        if self.translate_timeout_secs == 0 {
            return Err("translate_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn default_llm_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_translate_timeout_secs() -> u64 {
    20
}
fn default_timestep_ms() -> u64 {
    16
}
fn default_realtime() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_url: default_llm_url(),
            model: default_model(),
            api_key: String::new(),
            translate_timeout_secs: default_translate_timeout_secs(),
            timestep_ms: default_timestep_ms(),
            profile: MotionProfile::default(),
            realtime: default_realtime(),
            contact_at: None,
        }
    }
}

impl Config {
    pub fn translator_config(&self) -> TranslatorConfig {
        TranslatorConfig {
            base_url: self.llm_url.clone(),
            model: self.model.clone(),
            api_key: (!self.api_key.is_empty()).then(|| self.api_key.clone()),
            timeout: Duration::from_secs(self.translate_timeout_secs),
            ..TranslatorConfig::default()
        }
    }

    pub fn expander_config(&self) -> ExpanderConfig {
        ExpanderConfig {
            timestep_ms: self.timestep_ms,
            profile: self.profile,
            ..ExpanderConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            contact_sensors: self
                .contact_at
                .map(|_| vec![TOUCH_SENSOR.to_string()])
                .unwrap_or_default(),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            realtime: self.realtime,
            max_ticks: None,
        }
    }

    /// Devices the controller expects the robot to provide.
    pub fn manifest(&self) -> DeviceManifest {
        let mut manifest = DeviceManifest::new();
        for joint in UR10E_JOINTS.iter().chain(GRIPPER_FINGERS.iter()) {
            manifest = manifest
                .actuator(*joint)
                .sensor(format!("{joint}{POSITION_SENSOR_SUFFIX}"));
        }
        manifest = manifest.actuator(LEFT_WHEEL).actuator(RIGHT_WHEEL);
        if self.contact_at.is_some() {
            manifest = manifest.sensor(TOUCH_SENSOR);
        }
        manifest
    }
}

/// Return the path to `~/.motus/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".motus").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, MotusError> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, MotusError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| MotusError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| MotusError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()
        .map_err(|e| MotusError::Config(format!("invalid {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Defaults with environment overrides applied, for when no file exists.
pub fn from_env() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MOTUS_LLM_URL` | `llm_url` |
/// | `OPENAI_MODEL`, then `MOTUS_MODEL` | `model` |
/// | `OPENAI_API_KEY`, then `MOTUS_API_KEY` | `api_key` |
/// | `MOTUS_TIMESTEP_MS` | `timestep_ms` |
/// | `MOTUS_PROFILE` | `profile` |
///
/// Where two variables feed one field the `MOTUS_*` one wins.  Values that
/// do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MOTUS_LLM_URL") {
        cfg.llm_url = v;
    }
    for var in ["OPENAI_MODEL", "MOTUS_MODEL"] {
        if let Ok(v) = std::env::var(var)
            && !v.is_empty()
        {
            cfg.model = v;
        }
    }
    for var in ["OPENAI_API_KEY", "MOTUS_API_KEY"] {
        if let Ok(v) = std::env::var(var)
            && !v.is_empty()
        {
            cfg.api_key = v;
        }
    }
    if let Ok(v) = std::env::var("MOTUS_TIMESTEP_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.timestep_ms = ms;
    }
    if let Ok(v) = std::env::var("MOTUS_PROFILE")
        && let Ok(profile) = v.parse::<MotionProfile>()
    {
        cfg.profile = profile;
    }
}

/// Save the config to disk, creating `~/.motus/` if necessary.
pub fn save(cfg: &Config) -> Result<(), MotusError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), MotusError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| MotusError::Config(format!("failed to create config directory: {e}")))?;
        // Owner only (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| {
                    MotusError::Config(format!("failed to set config directory permissions: {e}"))
                })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| MotusError::Config(format!("failed to serialize config: {e}")))?;
    // Owner read/write only (rw-------).
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| MotusError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| MotusError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}
