//! Core state model for the village runner
//!
//! These types describe the account as last read from the game. Everything
//! except [`FarmTarget`] is replaced wholesale on every sync.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Identifier of a village as used by the game
pub type VillageId = String;

/// Identifier of a construction slot inside a village
pub type SlotId = String;

/// Unit type -> number of units
pub type TroopRequirement = BTreeMap<String, u32>;

/// Name the game gives an unbuilt slot
pub const EMPTY_SITE_NAME: &str = "Empty building site";

/// Map coordinates, also the identity of a raid target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}|{})", self.x, self.y)
    }
}

/// Stored resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmounts {
    pub wood: u64,
    pub clay: u64,
    pub iron: u64,
    pub crop: u64,
}

/// Warehouse and granary limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCapacity {
    pub warehouse: u64,
    pub granary: u64,
}

impl Default for StorageCapacity {
    fn default() -> Self {
        Self {
            warehouse: 800,
            granary: 800,
        }
    }
}

/// Hourly production. Crop is the net value and can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRates {
    pub wood: i64,
    pub clay: i64,
    pub iron: i64,
    pub crop: i64,
}

impl Default for ProductionRates {
    fn default() -> Self {
        Self {
            wood: 10,
            clay: 10,
            iron: 10,
            crop: 5,
        }
    }
}

/// Everything the resource bar of a village reports in one read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub resources: ResourceAmounts,
    pub storage: StorageCapacity,
    pub production: ProductionRates,
    pub population: u32,
    /// Net crop left after upkeep
    pub free_crop: i64,
}

/// A building in a slot, or an entry of the construction queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub name: String,
    pub level: u32,
    /// Game-wide building type id
    pub type_id: Option<String>,
    pub slot: Option<SlotId>,
    /// Seconds until done, only set on queue entries
    pub build_time_remaining: Option<u64>,
}

impl Building {
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
            type_id: None,
            slot: None,
            build_time_remaining: None,
        }
    }

    pub fn in_slot(mut self, slot: impl Into<SlotId>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    /// True when nothing has been built in this slot yet
    pub fn is_empty_site(&self) -> bool {
        self.level == 0 || self.name.eq_ignore_ascii_case(EMPTY_SITE_NAME)
    }
}

/// Units of one type stationed at home
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Troop {
    pub unit_type: String,
    pub count: u32,
}

impl Troop {
    pub fn new(unit_type: impl Into<String>, count: u32) -> Self {
        Self {
            unit_type: unit_type.into(),
            count,
        }
    }
}

/// A player village
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Village {
    pub id: VillageId,
    pub name: String,
    pub coordinates: Option<Coordinates>,
    pub resources: ResourceAmounts,
    pub storage: StorageCapacity,
    pub production: ProductionRates,
    pub population: u32,
    pub free_crop: i64,
    pub buildings: Vec<Building>,
    /// Construction in progress or pending; a snapshot owned by the game
    pub building_queue: Vec<Building>,
    pub troops_home: Vec<Troop>,
}

impl Village {
    pub fn new(id: impl Into<VillageId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            coordinates: None,
            resources: ResourceAmounts::default(),
            storage: StorageCapacity::default(),
            production: ProductionRates::default(),
            population: 0,
            free_crop: 0,
            buildings: Vec::new(),
            building_queue: Vec::new(),
            troops_home: Vec::new(),
        }
    }

    /// Overwrite the resource bar values with a fresh read
    pub fn apply_resources(&mut self, snapshot: ResourceSnapshot) {
        self.resources = snapshot.resources;
        self.storage = snapshot.storage;
        self.production = snapshot.production;
        self.population = snapshot.population;
        self.free_crop = snapshot.free_crop;
    }

    /// Whether the stored resources cover `cost`
    pub fn can_afford(&self, cost: &ResourceAmounts) -> bool {
        self.resources.wood >= cost.wood
            && self.resources.clay >= cost.clay
            && self.resources.iron >= cost.iron
            && self.resources.crop >= cost.crop
    }

    pub fn building_in_slot(&self, slot: &str) -> Option<&Building> {
        self.buildings
            .iter()
            .find(|b| b.slot.as_deref() == Some(slot))
    }

    /// Units of `unit_type` at home, matched case-insensitively
    pub fn troop_count(&self, unit_type: &str) -> u32 {
        self.troops_home
            .iter()
            .find(|t| t.unit_type.eq_ignore_ascii_case(unit_type))
            .map(|t| t.count)
            .unwrap_or(0)
    }

    pub fn total_troops(&self) -> u64 {
        self.troops_home.iter().map(|t| t.count as u64).sum()
    }

    pub fn active_constructions(&self) -> usize {
        self.building_queue.len()
    }
}

/// Where the hero currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeroStatus {
    AtHome,
    OnAdventure,
    InTransit,
    #[default]
    Unknown,
}

impl fmt::Display for HeroStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeroStatus::AtHome => write!(f, "at home"),
            HeroStatus::OnAdventure => write!(f, "on adventure"),
            HeroStatus::InTransit => write!(f, "in transit"),
            HeroStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hero {
    /// Health percentage, 0..=100
    pub health: u8,
    /// Experience percentage towards the next level, 0..=100
    pub experience: u8,
    pub status: HeroStatus,
    pub adventure_available: bool,
}

impl Hero {
    pub fn new(health: u8, experience: u8, status: HeroStatus, adventure_available: bool) -> Self {
        Self {
            health: health.min(100),
            experience: experience.min(100),
            status,
            adventure_available,
        }
    }

    /// Optimistic local update after a dispatch was accepted. The next sync
    /// overwrites it with what the game reports.
    pub fn mark_adventure_dispatched(&mut self) {
        self.adventure_available = false;
    }
}

/// The whole account as last synced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub villages: Vec<Village>,
    pub hero: Option<Hero>,
}

impl Account {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            villages: Vec::new(),
            hero: None,
        }
    }

    /// Add a village. Returns `false` and leaves the account untouched if a
    /// village with the same id is already present.
    pub fn add_village(&mut self, village: Village) -> bool {
        if self.village(&village.id).is_some() {
            return false;
        }
        self.villages.push(village);
        true
    }

    /// The first village, used as the default raid source
    pub fn primary_village(&self) -> Option<&Village> {
        self.villages.first()
    }

    pub fn village(&self, id: &str) -> Option<&Village> {
        self.villages.iter().find(|v| v.id == id)
    }

    pub fn village_mut(&mut self, id: &str) -> Option<&mut Village> {
        self.villages.iter_mut().find(|v| v.id == id)
    }

    pub fn village_ids(&self) -> Vec<VillageId> {
        self.villages.iter().map(|v| v.id.clone()).collect()
    }
}

/// A village or oasis around one of ours, as read from the map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearbyTarget {
    pub name: String,
    #[serde(rename = "coords")]
    pub coordinates: Coordinates,
    pub population: u32,
    /// "village", "oasis_wood", "oasis_crop", ...
    #[serde(rename = "type")]
    pub kind: String,
    /// "inactive", "active", "oasis", "unknown"
    pub player_status: String,
    /// "weak", "natar", "unknown", ...
    pub defense_hint: String,
}

/// A validated raid target owned by the farming manager
#[derive(Debug, Clone, PartialEq)]
pub struct FarmTarget {
    pub coordinates: Coordinates,
    pub name: String,
    pub source_village_id: VillageId,
    /// Units to send per raid; every count is positive
    pub troops: TroopRequirement,
    /// Last successful raid, `None` if never raided
    pub last_raid_at: Option<Instant>,
}

impl FarmTarget {
    /// Time left before the target may be raided again, `None` if it may be
    /// raided now
    pub fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        let last = self.last_raid_at?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_rejects_duplicate_village_ids() {
        let mut account = Account::new("player");
        assert!(account.add_village(Village::new("100", "Capital")));
        assert!(!account.add_village(Village::new("100", "Impostor")));
        assert!(account.add_village(Village::new("101", "Second")));

        assert_eq!(account.villages.len(), 2);
        assert_eq!(account.primary_village().unwrap().name, "Capital");
    }

    #[test]
    fn test_troop_count_is_case_insensitive() {
        let mut village = Village::new("1", "Home");
        village.troops_home = vec![Troop::new("Legionnaire", 20), Troop::new("Praetorian", 3)];

        assert_eq!(village.troop_count("legionnaire"), 20);
        assert_eq!(village.troop_count("PRAETORIAN"), 3);
        assert_eq!(village.troop_count("Imperian"), 0);
        assert_eq!(village.total_troops(), 23);
    }

    #[test]
    fn test_can_afford() {
        let mut village = Village::new("1", "Home");
        village.resources = ResourceAmounts {
            wood: 100,
            clay: 80,
            iron: 60,
            crop: 40,
        };

        assert!(village.can_afford(&ResourceAmounts {
            wood: 100,
            clay: 80,
            iron: 0,
            crop: 0
        }));
        assert!(!village.can_afford(&ResourceAmounts {
            wood: 0,
            clay: 0,
            iron: 61,
            crop: 0
        }));
    }

    #[test]
    fn test_hero_percentages_are_clamped() {
        let hero = Hero::new(250, 101, HeroStatus::AtHome, true);
        assert_eq!(hero.health, 100);
        assert_eq!(hero.experience, 100);
    }

    #[test]
    fn test_empty_site_detection() {
        assert!(Building::new(EMPTY_SITE_NAME, 0).is_empty_site());
        assert!(Building::new("Warehouse", 0).is_empty_site());
        assert!(!Building::new("Warehouse", 1).is_empty_site());
    }

    #[test]
    fn test_cooldown_remaining() {
        let start = Instant::now();
        let cooldown = Duration::from_secs(1800);
        let mut target = FarmTarget {
            coordinates: Coordinates::new(1, 2),
            name: "Oasis".to_string(),
            source_village_id: "1".to_string(),
            troops: TroopRequirement::new(),
            last_raid_at: None,
        };
        assert_eq!(target.cooldown_remaining(start, cooldown), None);

        target.last_raid_at = Some(start);
        assert_eq!(
            target.cooldown_remaining(start + Duration::from_secs(600), cooldown),
            Some(Duration::from_secs(1200))
        );
        assert_eq!(target.cooldown_remaining(start + cooldown, cooldown), None);
    }
}
