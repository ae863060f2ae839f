//! Simulated game - an in-memory world for dry runs
//!
//! Every resource read advances the world by one tick: production is added
//! and queued constructions progress. Nothing here talks to a real server.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::{GameError, GameResult};
use crate::game::GameInterface;
use crate::types::{
    Building, Coordinates, Hero, HeroStatus, NearbyTarget, ResourceAmounts, ResourceSnapshot,
    Troop, TroopRequirement, Village, EMPTY_SITE_NAME,
};

/// Simulated seconds that pass per resource read
const SIM_TICK_SECS: u64 = 300;

/// Hero syncs an adventure lasts
const ADVENTURE_SYNCS: u32 = 3;

const LEGIONNAIRE_COST: ResourceAmounts = ResourceAmounts {
    wood: 120,
    clay: 100,
    iron: 150,
    crop: 30,
};

pub struct SimulatedGame {
    logged_in: bool,
    village: Village,
    hero: Hero,
    adventure_syncs_left: u32,
    rng: StdRng,
}

impl SimulatedGame {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut village = Village::new("1001", "Sim Capital");
        village.coordinates = Some(Coordinates::new(0, 0));
        village.resources = ResourceAmounts {
            wood: 750,
            clay: 750,
            iron: 750,
            crop: 750,
        };
        village.population = 12;
        village.free_crop = 8;
        village.buildings = vec![
            Building::new("Woodcutter", 1).in_slot("1").with_type("1"),
            Building::new("Clay Pit", 0).in_slot("2").with_type("2"),
            Building::new("Iron Mine", 0).in_slot("3").with_type("3"),
            Building::new("Cropland", 1).in_slot("5").with_type("4"),
            Building::new("Warehouse", 0).in_slot("21").with_type("10"),
            Building::new(EMPTY_SITE_NAME, 0).in_slot("22"),
            Building::new("Main Building", 1).in_slot("26").with_type("15"),
            Building::new(EMPTY_SITE_NAME, 0).in_slot("30"),
        ];
        village.troops_home = vec![Troop::new("Legionnaire", 12)];

        Self {
            logged_in: false,
            village,
            hero: Hero::new(100, 0, HeroStatus::AtHome, true),
            adventure_syncs_left: 0,
            rng,
        }
    }

    fn session(&self) -> GameResult<()> {
        if self.logged_in {
            Ok(())
        } else {
            Err(GameError::SessionInactive)
        }
    }

    fn village(&self, village_id: &str) -> GameResult<&Village> {
        self.session()?;
        if self.village.id == village_id {
            Ok(&self.village)
        } else {
            Err(GameError::Command(format!("unknown village {}", village_id)))
        }
    }

    fn village_mut(&mut self, village_id: &str) -> GameResult<&mut Village> {
        self.village(village_id)?;
        Ok(&mut self.village)
    }

    fn advance(&mut self) {
        let village = &mut self.village;
        let hours = SIM_TICK_SECS as f64 / 3600.0;
        let add = |stored: u64, rate: i64, cap: u64| -> u64 {
            let gained = (rate as f64 * hours).round() as i64;
            (stored as i64 + gained).clamp(0, cap as i64) as u64
        };
        village.resources.wood = add(village.resources.wood, village.production.wood, village.storage.warehouse);
        village.resources.clay = add(village.resources.clay, village.production.clay, village.storage.warehouse);
        village.resources.iron = add(village.resources.iron, village.production.iron, village.storage.warehouse);
        village.resources.crop = add(village.resources.crop, village.production.crop, village.storage.granary);

        let mut finished = Vec::new();
        for entry in &mut village.building_queue {
            let left = entry.build_time_remaining.unwrap_or(0).saturating_sub(SIM_TICK_SECS);
            entry.build_time_remaining = Some(left);
            if left == 0 {
                finished.push(entry.clone());
            }
        }
        village
            .building_queue
            .retain(|entry| entry.build_time_remaining != Some(0));

        for done in finished {
            let slot = done.slot.as_deref();
            if let Some(building) = village.buildings.iter_mut().find(|b| b.slot.as_deref() == slot) {
                building.name = done.name.clone();
                building.level = done.level;
                village.population += 2;
                info!("[sim] {} reached level {}", done.name, done.level);
            }
        }
    }
}

#[async_trait(?Send)]
impl GameInterface for SimulatedGame {
    async fn login(&mut self) -> GameResult<()> {
        self.logged_in = true;
        info!("[sim] logged in");
        Ok(())
    }

    fn is_session_active(&self) -> bool {
        self.logged_in
    }

    async fn close(&mut self) {
        self.logged_in = false;
        info!("[sim] session closed");
    }

    async fn discover_villages(&mut self) -> GameResult<Vec<Village>> {
        self.session()?;
        let mut village = Village::new(self.village.id.clone(), self.village.name.clone());
        village.coordinates = self.village.coordinates;
        Ok(vec![village])
    }

    async fn sync_village_resources(&mut self, village_id: &str) -> GameResult<Option<ResourceSnapshot>> {
        self.village(village_id)?;
        self.advance();
        let village = &self.village;
        Ok(Some(ResourceSnapshot {
            resources: village.resources,
            storage: village.storage,
            production: village.production,
            population: village.population,
            free_crop: village.free_crop,
        }))
    }

    async fn sync_buildings(&mut self, village_id: &str) -> GameResult<Vec<Building>> {
        Ok(self.village(village_id)?.buildings.clone())
    }

    async fn sync_building_queue(&mut self, village_id: &str) -> GameResult<Vec<Building>> {
        Ok(self.village(village_id)?.building_queue.clone())
    }

    async fn sync_troops(&mut self, village_id: &str) -> GameResult<Vec<Troop>> {
        Ok(self.village(village_id)?.troops_home.clone())
    }

    async fn sync_hero(&mut self) -> GameResult<Option<Hero>> {
        self.session()?;
        if self.hero.status == HeroStatus::OnAdventure {
            self.adventure_syncs_left = self.adventure_syncs_left.saturating_sub(1);
            if self.adventure_syncs_left == 0 {
                self.hero.status = HeroStatus::AtHome;
                self.hero.experience = self.hero.experience.saturating_add(5).min(100);
                self.hero.health = self.hero.health.saturating_sub(10);
                self.hero.adventure_available = self.rng.gen_bool(0.5);
            }
        }
        Ok(Some(self.hero.clone()))
    }

    async fn start_building_upgrade(&mut self, name: &str, slot: &str, village_id: &str) -> GameResult<()> {
        let village = self.village_mut(village_id)?;
        if !village.building_queue.is_empty() {
            return Err(GameError::Command("construction queue is busy".to_string()));
        }
        let level = village.building_in_slot(slot).map(|b| b.level).unwrap_or(0);
        let step = 70 * (level as u64 + 1);
        let cost = ResourceAmounts {
            wood: step,
            clay: step,
            iron: step,
            crop: step / 2,
        };
        if !village.can_afford(&cost) {
            return Err(GameError::Command(format!("not enough resources to upgrade {}", name)));
        }

        village.resources.wood -= cost.wood;
        village.resources.clay -= cost.clay;
        village.resources.iron -= cost.iron;
        village.resources.crop -= cost.crop;
        let mut entry = Building::new(name, level + 1).in_slot(slot);
        entry.build_time_remaining = Some(600 * (level as u64 + 1));
        village.building_queue.push(entry);
        info!("[sim] upgrade of {} in slot {} queued", name, slot);
        Ok(())
    }

    async fn train_troops(&mut self, village_id: &str, unit_type: &str, amount: u32) -> GameResult<()> {
        let village = self.village_mut(village_id)?;
        let amount_u64 = amount as u64;
        let cost = ResourceAmounts {
            wood: LEGIONNAIRE_COST.wood * amount_u64,
            clay: LEGIONNAIRE_COST.clay * amount_u64,
            iron: LEGIONNAIRE_COST.iron * amount_u64,
            crop: LEGIONNAIRE_COST.crop * amount_u64,
        };
        if !village.can_afford(&cost) {
            return Err(GameError::Command(format!("not enough resources to train {} {}", amount, unit_type)));
        }

        village.resources.wood -= cost.wood;
        village.resources.clay -= cost.clay;
        village.resources.iron -= cost.iron;
        village.resources.crop -= cost.crop;
        match village
            .troops_home
            .iter_mut()
            .find(|t| t.unit_type.eq_ignore_ascii_case(unit_type))
        {
            Some(troop) => troop.count += amount,
            None => village.troops_home.push(Troop::new(unit_type, amount)),
        }
        Ok(())
    }

    async fn dispatch_hero_adventure(&mut self) -> GameResult<()> {
        self.session()?;
        if !self.hero.adventure_available || self.hero.status != HeroStatus::AtHome {
            return Err(GameError::Command("no adventure available".to_string()));
        }
        self.hero.adventure_available = false;
        self.hero.status = HeroStatus::OnAdventure;
        self.adventure_syncs_left = ADVENTURE_SYNCS;
        Ok(())
    }

    async fn send_raid(&mut self, source_village_id: &str, target: Coordinates, units: &TroopRequirement) -> GameResult<()> {
        let village = self.village(source_village_id)?;
        for (unit, &count) in units {
            if village.troop_count(unit) < count {
                return Err(GameError::Command(format!("not enough {} for raid on {}", unit, target)));
            }
        }

        // Troops are back before the next sync; only the loot stays
        let loot = self.rng.gen_range(0..=60u64);
        let village = &mut self.village;
        village.resources.wood = (village.resources.wood + loot).min(village.storage.warehouse);
        village.resources.clay = (village.resources.clay + loot).min(village.storage.warehouse);
        village.resources.iron = (village.resources.iron + loot).min(village.storage.warehouse);
        village.resources.crop = (village.resources.crop + loot).min(village.storage.granary);
        debug!("[sim] raid on {} returned {} of each resource", target, loot);
        Ok(())
    }

    async fn fetch_nearby_targets(&mut self, village_id: &str, radius: u32) -> GameResult<Vec<NearbyTarget>> {
        let centre = self.village(village_id)?.coordinates.unwrap_or(Coordinates::new(0, 0));
        let radius = radius.max(1) as i32;
        let count = self.rng.gen_range(3..=8);

        let mut targets: Vec<NearbyTarget> = Vec::with_capacity(count);
        while targets.len() < count {
            let dx = self.rng.gen_range(-radius..=radius);
            let dy = self.rng.gen_range(-radius..=radius);
            let coordinates = Coordinates::new(centre.x + dx, centre.y + dy);
            if coordinates == centre || targets.iter().any(|t| t.coordinates == coordinates) {
                continue;
            }

            let index = targets.len() + 1;
            let target = if self.rng.gen_bool(0.3) {
                NearbyTarget {
                    name: format!("Oasis {}", index),
                    coordinates,
                    population: 0,
                    kind: ["oasis_wood", "oasis_clay", "oasis_iron", "oasis_crop"][self.rng.gen_range(0..4)].to_string(),
                    player_status: "oasis".to_string(),
                    defense_hint: "unknown".to_string(),
                }
            } else {
                let inactive = self.rng.gen_bool(0.5);
                NearbyTarget {
                    name: format!("Village {}", index),
                    coordinates,
                    population: self.rng.gen_range(5..=150),
                    kind: "village".to_string(),
                    player_status: if inactive { "inactive" } else { "active" }.to_string(),
                    defense_hint: if inactive { "weak" } else { "unknown" }.to_string(),
                }
            };
            targets.push(target);
        }
        Ok(targets)
    }
}
