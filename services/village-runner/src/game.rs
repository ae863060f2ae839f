//! Game Interface - the read/command surface of the live game
//!
//! Implemented by the page automation layer. The engine calls it from the
//! single task that owns the session, so implementations do not need to be
//! `Send`.

use async_trait::async_trait;

use crate::error::GameResult;
use crate::types::{
    Building, Coordinates, Hero, NearbyTarget, ResourceSnapshot, Troop, TroopRequirement, Village,
};

#[async_trait(?Send)]
pub trait GameInterface {
    /// Establish (or re-establish) the session
    async fn login(&mut self) -> GameResult<()>;

    fn is_session_active(&self) -> bool;

    /// Release the session and everything behind it
    async fn close(&mut self);

    /// Villages of the account with ids and names filled in
    async fn discover_villages(&mut self) -> GameResult<Vec<Village>>;

    /// `Ok(None)` when the resource bar could not be read
    async fn sync_village_resources(&mut self, village_id: &str) -> GameResult<Option<ResourceSnapshot>>;

    async fn sync_buildings(&mut self, village_id: &str) -> GameResult<Vec<Building>>;

    async fn sync_building_queue(&mut self, village_id: &str) -> GameResult<Vec<Building>>;

    async fn sync_troops(&mut self, village_id: &str) -> GameResult<Vec<Troop>>;

    /// `Ok(None)` when the hero page could not be read
    async fn sync_hero(&mut self) -> GameResult<Option<Hero>>;

    async fn start_building_upgrade(&mut self, name: &str, slot: &str, village_id: &str) -> GameResult<()>;

    async fn train_troops(&mut self, village_id: &str, unit_type: &str, amount: u32) -> GameResult<()>;

    async fn dispatch_hero_adventure(&mut self) -> GameResult<()>;

    async fn send_raid(
        &mut self,
        source_village_id: &str,
        target: Coordinates,
        units: &TroopRequirement,
    ) -> GameResult<()>;

    async fn fetch_nearby_targets(&mut self, village_id: &str, radius: u32) -> GameResult<Vec<NearbyTarget>>;
}
