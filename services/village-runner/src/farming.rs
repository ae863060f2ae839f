//! Farming manager - owns the raid target list and runs raid cycles

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::FarmingConfig;
use crate::error::GameResult;
use crate::game::GameInterface;
use crate::report::Reporter;
use crate::shutdown::StopSignal;
use crate::timer::Clock;
use crate::types::{Account, Coordinates, FarmTarget, TroopRequirement};

/// An unvalidated raid target, as suggested by the advisor or a user
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FarmCandidate {
    #[serde(default)]
    pub village_name: Option<String>,
    /// Expected shape `{"x": 10, "y": -5}`
    #[serde(default)]
    pub target_coords: Option<Value>,
    /// Unit type -> count
    #[serde(default)]
    pub troops: Option<Map<String, Value>>,
    #[serde(default)]
    pub source_village_id: Option<String>,
    #[serde(skip)]
    pub last_raid_at: Option<Instant>,
}

impl FarmCandidate {
    pub fn new(name: &str, x: i32, y: i32, troops: &[(&str, u32)]) -> Self {
        Self {
            village_name: Some(name.to_string()),
            target_coords: Some(serde_json::json!({ "x": x, "y": y })),
            troops: Some(
                troops
                    .iter()
                    .map(|(unit, count)| (unit.to_string(), Value::from(*count)))
                    .collect(),
            ),
            source_village_id: None,
            last_raid_at: None,
        }
    }

    pub fn from_village(mut self, village_id: &str) -> Self {
        self.source_village_id = Some(village_id.to_string());
        self
    }

    fn label(&self) -> String {
        match (&self.village_name, &self.target_coords) {
            (Some(name), Some(coords)) => format!("'{}' {}", name, coords),
            (Some(name), None) => format!("'{}'", name),
            (None, Some(coords)) => coords.to_string(),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

/// A required unit type the source village is short of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TroopDeficit {
    pub unit_type: String,
    pub required: u32,
    pub available: u32,
}

/// Whether one target can be raided right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaidDecision {
    MissingSource,
    CoolingDown { remaining: Duration },
    /// The requirement map holds no positive counts
    NoValidTroops,
    /// At least one required type is short; the raid is not sent at all
    Insufficient { deficits: Vec<TroopDeficit> },
    /// Send exactly these units
    Ready { units: TroopRequirement },
}

/// Counts of what happened in one raid cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaidCycleSummary {
    pub dispatched: usize,
    pub failed: usize,
    pub cooling_down: usize,
    pub insufficient: usize,
    pub skipped: usize,
}

pub struct FarmingManager {
    targets: Vec<FarmTarget>,
    config: FarmingConfig,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    reporter: Reporter,
}

impl FarmingManager {
    pub fn new(config: FarmingConfig, clock: Arc<dyn Clock>, reporter: Reporter) -> Self {
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            targets: Vec::new(),
            config,
            clock,
            rng,
            reporter,
        }
    }

    pub fn targets(&self) -> &[FarmTarget] {
        &self.targets
    }

    pub fn target(&self, coordinates: Coordinates) -> Option<&FarmTarget> {
        self.targets.iter().find(|t| t.coordinates == coordinates)
    }

    /// Validate `candidates` and replace the farm list with the survivors.
    ///
    /// Invalid entries and repeated coordinates are dropped (first wins).
    /// Targets already on the list keep their last raid time when
    /// `preserve_cooldowns` is set. Returns the new list length.
    pub fn set_farm_list(&mut self, candidates: Vec<FarmCandidate>, account: &Account) -> usize {
        let default_source = account.primary_village().map(|v| v.id.clone());
        let previous: HashMap<Coordinates, Option<Instant>> = self
            .targets
            .iter()
            .map(|t| (t.coordinates, t.last_raid_at))
            .collect();

        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let label = candidate.label();
            let mut target = match self.validate(candidate, default_source.as_deref()) {
                Ok(target) => target,
                Err(reason) => {
                    self.reporter
                        .warn(format!("Skipping invalid farm target {}: {}", label, reason));
                    continue;
                }
            };

            if !seen.insert(target.coordinates) {
                self.reporter.info(format!(
                    "Skipping duplicate farm target coordinates {}",
                    target.coordinates
                ));
                continue;
            }

            if target.last_raid_at.is_none() && self.config.preserve_cooldowns {
                target.last_raid_at = previous.get(&target.coordinates).copied().flatten();
            }
            accepted.push(target);
        }

        self.targets = accepted;
        self.reporter
            .info(format!("Farm list updated with {} targets", self.targets.len()));
        self.reporter.farm_list_updated(&self.targets);
        self.targets.len()
    }

    fn validate(&self, candidate: FarmCandidate, default_source: Option<&str>) -> Result<FarmTarget, String> {
        let coords = candidate
            .target_coords
            .as_ref()
            .ok_or_else(|| "missing coordinates".to_string())?;
        let coordinates = parse_coordinates(coords)?;

        let raw_troops = candidate
            .troops
            .as_ref()
            .ok_or_else(|| "missing troop requirements".to_string())?;

        let mut troops = TroopRequirement::new();
        for (unit, raw) in raw_troops {
            match parse_count(raw) {
                Some(count) if count > 0 => {
                    // Unit names match home troops case-insensitively, so
                    // case variants name the same unit; the first one wins
                    if let Some(kept) = troops.keys().find(|k| k.eq_ignore_ascii_case(unit)) {
                        self.reporter.info(format!(
                            "Ignoring troop entry {}={} for target {}, already requires {}",
                            unit, raw, coordinates, kept
                        ));
                        continue;
                    }
                    troops.insert(unit.clone(), count);
                }
                _ => self.reporter.info(format!(
                    "Ignoring troop entry {}={} for target {}",
                    unit, raw, coordinates
                )),
            }
        }

        let source_village_id = candidate
            .source_village_id
            .clone()
            .or_else(|| default_source.map(str::to_string))
            .ok_or_else(|| "no source village available".to_string())?;

        Ok(FarmTarget {
            coordinates,
            name: candidate
                .village_name
                .clone()
                .unwrap_or_else(|| format!("Target {}", coordinates)),
            source_village_id,
            troops,
            last_raid_at: candidate.last_raid_at,
        })
    }

    /// Run every gate for one target
    pub fn evaluate(target: &FarmTarget, account: &Account, now: Instant, cooldown: Duration) -> RaidDecision {
        let Some(source) = account.village(&target.source_village_id) else {
            return RaidDecision::MissingSource;
        };

        if let Some(remaining) = target.cooldown_remaining(now, cooldown) {
            return RaidDecision::CoolingDown { remaining };
        }

        let mut units = TroopRequirement::new();
        let mut deficits = Vec::new();
        // Case variants of one unit draw from the same home count
        let mut committed: HashMap<String, u32> = HashMap::new();
        for (unit_type, &required) in &target.troops {
            if required == 0 {
                continue;
            }
            let used = committed.entry(unit_type.to_ascii_lowercase()).or_insert(0);
            let available = source.troop_count(unit_type).saturating_sub(*used);
            *used = used.saturating_add(required);
            if available >= required {
                units.insert(unit_type.clone(), required);
            } else {
                deficits.push(TroopDeficit {
                    unit_type: unit_type.clone(),
                    required,
                    available,
                });
            }
        }

        if !deficits.is_empty() {
            RaidDecision::Insufficient { deficits }
        } else if units.is_empty() {
            RaidDecision::NoValidTroops
        } else {
            RaidDecision::Ready { units }
        }
    }

    /// Try every target once, in random order.
    ///
    /// Session-loss errors abort the cycle; any other failed raid is logged
    /// and the target stays eligible.
    pub async fn run_raid_cycle<G: GameInterface + ?Sized>(
        &mut self,
        game: &mut G,
        account: &Account,
        stop: &mut StopSignal,
    ) -> GameResult<RaidCycleSummary> {
        let mut summary = RaidCycleSummary::default();

        if account.villages.is_empty() {
            self.reporter
                .info("No villages on the account, skipping raid cycle");
            return Ok(summary);
        }
        if self.targets.is_empty() {
            self.reporter.info("Farm list is empty, skipping raid cycle");
            return Ok(summary);
        }

        self.reporter
            .info(format!("Starting raid cycle ({} targets)", self.targets.len()));
        self.targets.shuffle(&mut self.rng);

        let cooldown = self.config.target_cooldown();
        let mut attempted = false;

        for idx in 0..self.targets.len() {
            if stop.is_stopped() {
                self.reporter.info("Stop requested, ending raid cycle early");
                break;
            }

            let now = self.clock.now();
            let target = &self.targets[idx];
            let source_name = account
                .village(&target.source_village_id)
                .map(|v| v.name.clone())
                .unwrap_or_default();

            let units = match Self::evaluate(target, account, now, cooldown) {
                RaidDecision::MissingSource => {
                    self.reporter.info(format!(
                        "Source village {} for target '{}' {} not found, skipping",
                        target.source_village_id, target.name, target.coordinates
                    ));
                    summary.skipped += 1;
                    continue;
                }
                RaidDecision::CoolingDown { remaining } => {
                    self.reporter.info(format!(
                        "Target '{}' {} is cooling down, ~{} min left",
                        target.name,
                        target.coordinates,
                        remaining.as_secs().div_ceil(60)
                    ));
                    summary.cooling_down += 1;
                    continue;
                }
                RaidDecision::NoValidTroops => {
                    self.reporter.info(format!(
                        "Target '{}' {} has no valid troop requirement, skipping",
                        target.name, target.coordinates
                    ));
                    summary.skipped += 1;
                    continue;
                }
                RaidDecision::Insufficient { deficits } => {
                    let missing = deficits
                        .iter()
                        .map(|d| format!("{} (required: {}, available: {})", d.unit_type, d.required, d.available))
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.reporter.info(format!(
                        "Not enough troops in '{}' for target '{}' {}. Missing: {}",
                        source_name, target.name, target.coordinates, missing
                    ));
                    summary.insufficient += 1;
                    continue;
                }
                RaidDecision::Ready { units } => units,
            };

            let coordinates = target.coordinates;
            let name = target.name.clone();
            let source_id = target.source_village_id.clone();

            if attempted {
                let pause = self.config.raid_pacing.sample(&mut self.rng);
                if !stop.sleep(pause).await {
                    self.reporter.info("Stop requested, ending raid cycle early");
                    break;
                }
            }
            attempted = true;

            self.reporter.info(format!(
                "Sending raid from '{}' to '{}' {} with {:?}",
                source_name, name, coordinates, units
            ));
            match game.send_raid(&source_id, coordinates, &units).await {
                Ok(()) => {
                    self.targets[idx].last_raid_at = Some(self.clock.now());
                    self.reporter
                        .info(format!("Raid sent to '{}' {}", name, coordinates));
                    summary.dispatched += 1;
                }
                Err(e) if e.is_session_loss() => return Err(e),
                Err(e) => {
                    self.reporter
                        .warn(format!("Raid to '{}' {} failed: {}", name, coordinates, e));
                    summary.failed += 1;
                }
            }
        }

        self.reporter.info(format!(
            "Raid cycle complete: {} sent, {} failed, {} cooling down, {} short of troops, {} skipped",
            summary.dispatched, summary.failed, summary.cooling_down, summary.insufficient, summary.skipped
        ));
        Ok(summary)
    }
}

fn parse_coordinates(value: &Value) -> Result<Coordinates, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("coordinates must be an object, got {}", value))?;
    let x = obj.get("x").ok_or_else(|| "missing x coordinate".to_string())?;
    let y = obj.get("y").ok_or_else(|| "missing y coordinate".to_string())?;
    match (parse_int(x), parse_int(y)) {
        (Some(x), Some(y)) => Ok(Coordinates::new(x, y)),
        _ => Err(format!("non-numeric coordinates ({}, {})", x, y)),
    }
}

fn parse_int(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryObserver;
    use crate::timer::ManualClock;
    use crate::types::{Troop, Village};
    use serde_json::json;

    fn account() -> Account {
        let mut account = Account::new("player");
        let mut village = Village::new("100", "Capital");
        village.troops_home = vec![Troop::new("Legionnaire", 20)];
        account.add_village(village);
        account
    }

    fn manager() -> (FarmingManager, Arc<ManualClock>, Arc<MemoryObserver>) {
        let clock = Arc::new(ManualClock::new());
        let observer = Arc::new(MemoryObserver::new());
        let config = FarmingConfig {
            shuffle_seed: Some(1),
            ..FarmingConfig::default()
        };
        let manager = FarmingManager::new(config, clock.clone(), Reporter::new(Some(observer.clone())));
        (manager, clock, observer)
    }

    #[test]
    fn test_duplicate_coordinates_keep_first() {
        let (mut manager, _, observer) = manager();
        let count = manager.set_farm_list(
            vec![
                FarmCandidate::new("First", 10, -5, &[("Legionnaire", 10)]),
                FarmCandidate::new("Second", 10, -5, &[("Legionnaire", 5)]),
            ],
            &account(),
        );

        assert_eq!(count, 1);
        let target = manager.target(Coordinates::new(10, -5)).unwrap();
        assert_eq!(target.name, "First");
        assert_eq!(target.troops["Legionnaire"], 10);
        assert_eq!(observer.matching("duplicate").len(), 1);
    }

    #[test]
    fn test_malformed_candidates_are_rejected() {
        let (mut manager, _, _) = manager();
        let missing_troops = FarmCandidate {
            troops: None,
            ..FarmCandidate::new("No troops", 1, 1, &[])
        };
        let missing_coords = FarmCandidate {
            target_coords: None,
            ..FarmCandidate::new("No coords", 0, 0, &[("Legionnaire", 5)])
        };
        let bad_coords = FarmCandidate {
            target_coords: Some(json!({ "x": "north", "y": 3 })),
            ..FarmCandidate::new("Bad coords", 0, 0, &[("Legionnaire", 5)])
        };
        let half_coords = FarmCandidate {
            target_coords: Some(json!({ "x": 4 })),
            ..FarmCandidate::new("Half coords", 0, 0, &[("Legionnaire", 5)])
        };
        let string_coords = FarmCandidate {
            target_coords: Some(json!({ "x": "7", "y": "-2" })),
            ..FarmCandidate::new("String coords", 0, 0, &[("Legionnaire", 5)])
        };

        let count = manager.set_farm_list(
            vec![missing_troops, missing_coords, bad_coords, half_coords, string_coords],
            &account(),
        );

        assert_eq!(count, 1);
        assert!(manager.target(Coordinates::new(7, -2)).is_some());
    }

    #[test]
    fn test_defaults_assigned_on_ingestion() {
        let (mut manager, _, _) = manager();
        let mut unnamed = FarmCandidate::new("x", 3, 4, &[("Legionnaire", 5)]);
        unnamed.village_name = None;
        manager.set_farm_list(
            vec![
                unnamed,
                FarmCandidate::new("Elsewhere", 5, 6, &[("Legionnaire", 5)]).from_village("101"),
            ],
            &account(),
        );

        let first = manager.target(Coordinates::new(3, 4)).unwrap();
        assert_eq!(first.source_village_id, "100");
        assert_eq!(first.name, "Target (3|4)");
        assert_eq!(first.last_raid_at, None);
        assert_eq!(
            manager.target(Coordinates::new(5, 6)).unwrap().source_village_id,
            "101"
        );
    }

    #[test]
    fn test_invalid_counts_dropped_individually() {
        let (mut manager, _, _) = manager();
        let mut candidate = FarmCandidate::new("Mixed", 1, 2, &[("Legionnaire", 10)]);
        let troops = candidate.troops.as_mut().unwrap();
        troops.insert("Phalanx".to_string(), json!(0));
        troops.insert("Swordsman".to_string(), json!("lots"));
        troops.insert("Praetorian".to_string(), json!(-4));

        manager.set_farm_list(vec![candidate], &account());

        let target = manager.target(Coordinates::new(1, 2)).unwrap();
        assert_eq!(target.troops.len(), 1);
        assert_eq!(target.troops["Legionnaire"], 10);
    }

    #[test]
    fn test_replacement_preserves_last_raid_time() {
        let (mut manager, clock, _) = manager();
        let account = account();
        manager.set_farm_list(vec![FarmCandidate::new("Oasis", 2, 2, &[("Legionnaire", 5)])], &account);
        let raided_at = clock.now();
        manager.targets[0].last_raid_at = Some(raided_at);

        manager.set_farm_list(
            vec![
                FarmCandidate::new("Oasis again", 2, 2, &[("Legionnaire", 8)]),
                FarmCandidate::new("New", 9, 9, &[("Legionnaire", 5)]),
            ],
            &account,
        );

        let kept = manager.target(Coordinates::new(2, 2)).unwrap();
        assert_eq!(kept.last_raid_at, Some(raided_at));
        assert_eq!(kept.troops["Legionnaire"], 8);
        assert_eq!(manager.target(Coordinates::new(9, 9)).unwrap().last_raid_at, None);
    }

    #[test]
    fn test_replacement_can_reset_cooldowns() {
        let clock = Arc::new(ManualClock::new());
        let config = FarmingConfig {
            preserve_cooldowns: false,
            ..FarmingConfig::default()
        };
        let mut manager = FarmingManager::new(config, clock.clone(), Reporter::default());
        let account = account();
        manager.set_farm_list(vec![FarmCandidate::new("Oasis", 2, 2, &[("Legionnaire", 5)])], &account);
        manager.targets[0].last_raid_at = Some(clock.now());

        manager.set_farm_list(vec![FarmCandidate::new("Oasis", 2, 2, &[("Legionnaire", 5)])], &account);
        assert_eq!(manager.targets()[0].last_raid_at, None);
    }

    #[test]
    fn test_all_or_nothing_sufficiency() {
        let (mut manager, clock, _) = manager();
        let account = account();
        manager.set_farm_list(
            vec![FarmCandidate::new("Camp", 4, 4, &[("Legionnaire", 10), ("Phalanx", 5)])],
            &account,
        );

        let decision = FarmingManager::evaluate(
            &manager.targets()[0],
            &account,
            clock.now(),
            Duration::from_secs(1800),
        );
        assert_eq!(
            decision,
            RaidDecision::Insufficient {
                deficits: vec![TroopDeficit {
                    unit_type: "Phalanx".to_string(),
                    required: 5,
                    available: 0,
                }]
            }
        );
    }

    #[test]
    fn test_ready_payload_is_exact_requirement() {
        let (mut manager, clock, _) = manager();
        let account = account();
        manager.set_farm_list(vec![FarmCandidate::new("Camp", 4, 4, &[("legionnaire", 10)])], &account);

        let decision = FarmingManager::evaluate(
            &manager.targets()[0],
            &account,
            clock.now(),
            Duration::from_secs(1800),
        );
        let mut expected = TroopRequirement::new();
        expected.insert("legionnaire".to_string(), 10);
        assert_eq!(decision, RaidDecision::Ready { units: expected });
    }

    #[test]
    fn test_case_variant_units_merge_on_ingestion() {
        let (mut manager, clock, observer) = manager();
        let account = account();
        manager.set_farm_list(
            vec![FarmCandidate::new("Camp", 4, 4, &[("Legionnaire", 10), ("legionnaire", 15)])],
            &account,
        );

        let target = manager.target(Coordinates::new(4, 4)).unwrap();
        assert_eq!(target.troops.len(), 1);
        assert_eq!(target.troops["Legionnaire"], 10);
        assert_eq!(observer.matching("already requires Legionnaire").len(), 1);

        let mut expected = TroopRequirement::new();
        expected.insert("Legionnaire".to_string(), 10);
        assert_eq!(
            FarmingManager::evaluate(target, &account, clock.now(), Duration::ZERO),
            RaidDecision::Ready { units: expected }
        );
    }

    #[test]
    fn test_case_variants_share_home_count() {
        let account = account();
        let mut troops = TroopRequirement::new();
        troops.insert("Legionnaire".to_string(), 10);
        troops.insert("legionnaire".to_string(), 15);
        let target = FarmTarget {
            coordinates: Coordinates::new(4, 4),
            name: "Camp".to_string(),
            source_village_id: "100".to_string(),
            troops,
            last_raid_at: None,
        };

        // 20 at home cover the first 10, leaving 10 for the other 15
        assert_eq!(
            FarmingManager::evaluate(&target, &account, tokio::time::Instant::now(), Duration::ZERO),
            RaidDecision::Insufficient {
                deficits: vec![TroopDeficit {
                    unit_type: "legionnaire".to_string(),
                    required: 15,
                    available: 10,
                }]
            }
        );
    }

    #[test]
    fn test_missing_source_village() {
        let (mut manager, clock, _) = manager();
        let account = account();
        manager.set_farm_list(
            vec![FarmCandidate::new("Far", 4, 4, &[("Legionnaire", 1)]).from_village("999")],
            &account,
        );
        assert_eq!(
            FarmingManager::evaluate(&manager.targets()[0], &account, clock.now(), Duration::ZERO),
            RaidDecision::MissingSource
        );
    }
}
