//! Runner Configuration
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables of the form `VILLAGE_RUNNER__<SECTION>__<KEY>`, e.g.
//! `VILLAGE_RUNNER__FARMING__TARGET_COOLDOWN_SECS=2700`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::policy::construction::default_build_order;
use crate::policy::training::default_training_preferences;
use crate::policy::{BuildGoal, TrainingPreference};
use crate::types::VillageId;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "VILLAGE_RUNNER";

/// Inclusive range of seconds a randomized delay is drawn from
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct SecsRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl SecsRange {
    pub const fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn min(&self) -> Duration {
        Duration::from_secs(self.min_secs)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }

    /// Draw a delay uniformly from the range, millisecond resolution
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_secs <= self.min_secs {
            return self.min();
        }
        let millis = rng.gen_range(self.min_secs * 1000..=self.max_secs * 1000);
        Duration::from_millis(millis)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.min_secs > self.max_secs {
            return Err(ConfigError::Invalid(format!(
                "{}: min_secs ({}) is greater than max_secs ({})",
                name, self.min_secs, self.max_secs
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub construction: ConstructionConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub adventure: AdventureConfig,
    #[serde(default)]
    pub farming: FarmingConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
}

impl EngineConfig {
    /// Load configuration from `path` (or the default location) plus
    /// environment overrides. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.map(Path::to_path_buf).or_else(default_config_path);

        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tick.interval.validate("tick.interval")?;
        self.tick.phase_pause.validate("tick.phase_pause")?;
        self.adventure.initial_cooldown.validate("adventure.initial_cooldown")?;
        self.adventure.success_cooldown.validate("adventure.success_cooldown")?;
        self.adventure.fail_cooldown.validate("adventure.fail_cooldown")?;
        self.farming.raid_pacing.validate("farming.raid_pacing")?;

        if self.session.max_login_attempts == 0 {
            return Err(ConfigError::Invalid(
                "session.max_login_attempts must be at least 1".to_string(),
            ));
        }
        if self.construction.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "construction.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.advisor.enabled && self.advisor.url.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Invalid(
                "advisor.url is required when the advisor is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/village-runner/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("village-runner").join("config.yaml"))
}

/// Main loop pacing
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TickConfig {
    /// Time between the starts of two ticks
    #[serde(default = "default_tick_interval")]
    pub interval: SecsRange,
    /// Pause between policy phases inside a tick
    #[serde(default = "default_phase_pause")]
    pub phase_pause: SecsRange,
    /// Pause after an unexpected error inside a tick
    #[serde(default = "default_error_pause_secs")]
    pub error_pause_secs: u64,
    /// Pause after the automation driver broke
    #[serde(default = "default_driver_error_pause_secs")]
    pub driver_error_pause_secs: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: default_tick_interval(),
            phase_pause: default_phase_pause(),
            error_pause_secs: default_error_pause_secs(),
            driver_error_pause_secs: default_driver_error_pause_secs(),
        }
    }
}

/// Session establishment
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    #[serde(default = "default_login_retry_delay_secs")]
    pub login_retry_delay_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: default_max_login_attempts(),
            login_retry_delay_secs: default_login_retry_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConstructionConfig {
    /// Constructions allowed in progress at once per village
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Build order used for villages without an override
    #[serde(default = "default_build_order")]
    pub goals: Vec<BuildGoal>,
    #[serde(default)]
    pub village_goals: HashMap<VillageId, Vec<BuildGoal>>,
}

impl ConstructionConfig {
    pub fn goals_for(&self, village_id: &str) -> &[BuildGoal] {
        self.village_goals
            .get(village_id)
            .map(Vec::as_slice)
            .unwrap_or(&self.goals)
    }
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            goals: default_build_order(),
            village_goals: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TrainingConfig {
    #[serde(default = "default_training_preferences")]
    pub preferences: Vec<TrainingPreference>,
    #[serde(default)]
    pub village_preferences: HashMap<VillageId, Vec<TrainingPreference>>,
}

impl TrainingConfig {
    pub fn preferences_for(&self, village_id: &str) -> &[TrainingPreference] {
        self.village_preferences
            .get(village_id)
            .map(Vec::as_slice)
            .unwrap_or(&self.preferences)
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            preferences: default_training_preferences(),
            village_preferences: HashMap::new(),
        }
    }
}

/// Cooldowns after each adventure check outcome
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct AdventureConfig {
    /// After a check that found no adventure (also armed at start)
    #[serde(default = "default_adventure_initial")]
    pub initial_cooldown: SecsRange,
    #[serde(default = "default_adventure_success")]
    pub success_cooldown: SecsRange,
    #[serde(default = "default_adventure_fail")]
    pub fail_cooldown: SecsRange,
}

impl Default for AdventureConfig {
    fn default() -> Self {
        Self {
            initial_cooldown: default_adventure_initial(),
            success_cooldown: default_adventure_success(),
            fail_cooldown: default_adventure_fail(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct FarmingConfig {
    /// Minimum time between two raids on the same target
    #[serde(default = "default_target_cooldown_secs")]
    pub target_cooldown_secs: u64,
    /// Pause between two raid dispatches
    #[serde(default = "default_raid_pacing")]
    pub raid_pacing: SecsRange,
    /// Map radius scanned for advisor input
    #[serde(default = "default_nearby_radius")]
    pub nearby_radius: u32,
    /// How often the farm list is rebuilt from advisor suggestions
    #[serde(default = "default_advisor_refresh_secs")]
    pub advisor_refresh_secs: u64,
    /// Keep last-raid times of targets that survive a list replacement
    #[serde(default = "default_true")]
    pub preserve_cooldowns: bool,
    /// Fixed seed for the raid order, random when unset
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl FarmingConfig {
    pub fn target_cooldown(&self) -> Duration {
        Duration::from_secs(self.target_cooldown_secs)
    }

    pub fn advisor_refresh(&self) -> Duration {
        Duration::from_secs(self.advisor_refresh_secs)
    }
}

impl Default for FarmingConfig {
    fn default() -> Self {
        Self {
            target_cooldown_secs: default_target_cooldown_secs(),
            raid_pacing: default_raid_pacing(),
            nearby_radius: default_nearby_radius(),
            advisor_refresh_secs: default_advisor_refresh_secs(),
            preserve_cooldowns: true,
            shuffle_seed: None,
        }
    }
}

/// Target advisor gateway
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Gateway endpoint receiving `{model, prompt}`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_advisor_model")]
    pub model: String,
    #[serde(default = "default_advisor_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum time between two upstream calls
    #[serde(default = "default_advisor_min_interval_secs")]
    pub min_interval_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            model: default_advisor_model(),
            timeout_secs: default_advisor_timeout_secs(),
            min_interval_secs: default_advisor_min_interval_secs(),
        }
    }
}

fn default_tick_interval() -> SecsRange { SecsRange::new(5 * 60, 10 * 60) }
fn default_phase_pause() -> SecsRange { SecsRange::new(1, 3) }
fn default_error_pause_secs() -> u64 { 60 }
fn default_driver_error_pause_secs() -> u64 { 30 }
fn default_max_login_attempts() -> u32 { 3 }
fn default_login_retry_delay_secs() -> u64 { 15 }
fn default_max_concurrent() -> usize { 1 }
fn default_adventure_initial() -> SecsRange { SecsRange::new(5 * 60, 10 * 60) }
fn default_adventure_success() -> SecsRange { SecsRange::new(60 * 60, 120 * 60) }
fn default_adventure_fail() -> SecsRange { SecsRange::new(10 * 60, 20 * 60) }
fn default_target_cooldown_secs() -> u64 { 30 * 60 }
fn default_raid_pacing() -> SecsRange { SecsRange::new(10, 20) }
fn default_nearby_radius() -> u32 { 7 }
fn default_advisor_refresh_secs() -> u64 { 4 * 60 * 60 }
fn default_true() -> bool { true }
fn default_advisor_model() -> String { "gemini-pro".to_string() }
fn default_advisor_timeout_secs() -> u64 { 30 }
fn default_advisor_min_interval_secs() -> u64 { 15 * 60 }

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tick.interval, SecsRange::new(300, 600));
        assert_eq!(config.farming.target_cooldown(), Duration::from_secs(1800));
        assert_eq!(config.farming.raid_pacing, SecsRange::new(10, 20));
        assert_eq!(config.farming.advisor_refresh(), Duration::from_secs(4 * 3600));
        assert_eq!(config.advisor.min_interval_secs, 900);
        assert_eq!(config.construction.max_concurrent, 1);
        assert_eq!(config.construction.goals.len(), 8);
        assert!(config.farming.preserve_cooldowns);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = SecsRange::new(10, 20);
        for _ in 0..100 {
            let d = range.sample(&mut rng);
            assert!(d >= range.min() && d <= range.max());
        }
        assert_eq!(SecsRange::new(5, 5).sample(&mut rng), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = EngineConfig::default();
        config.farming.raid_pacing = SecsRange::new(30, 10);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_requires_advisor_url() {
        let mut config = EngineConfig::default();
        config.advisor.enabled = true;
        assert!(config.validate().is_err());

        config.advisor.url = Some("http://localhost:8090/v1/suggest".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
tick:
  interval:
    min_secs: 60
    max_secs: 120
construction:
  max_concurrent: 2
  village_goals:
    "200":
      - name: Warehouse
        target_level: 5
        slot: "21"
training:
  preferences:
    - unit_type: Phalanx
      min_count: 30
      batch_size: 10
farming:
  target_cooldown_secs: 2700
"#
        )
        .unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.tick.interval, SecsRange::new(60, 120));
        assert_eq!(config.tick.error_pause_secs, 60);
        assert_eq!(config.construction.max_concurrent, 2);
        assert_eq!(config.construction.goals_for("200")[0].name, "Warehouse");
        assert_eq!(config.construction.goals_for("100").len(), 8);
        assert_eq!(config.training.preferences_for("100")[0].unit_type, "Phalanx");
        assert_eq!(config.farming.target_cooldown_secs, 2700);
        assert_eq!(config.farming.raid_pacing, SecsRange::new(10, 20));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.session.max_login_attempts, 3);
    }

    #[test]
    fn test_environment_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("VILLAGE_RUNNER__FARMING__NEARBY_RADIUS", "11");
        let config = EngineConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        std::env::remove_var("VILLAGE_RUNNER__FARMING__NEARBY_RADIUS");

        assert_eq!(config.farming.nearby_radius, 11);
    }
}
