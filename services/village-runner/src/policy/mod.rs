//! Policy executors. Each module decides; the engine issues the commands.

pub mod adventure;
pub mod construction;
pub mod training;

pub use adventure::{AdventureAction, AdventureOutcome, CooldownKind};
pub use construction::{BuildGoal, ConstructionPlan, GoalCheck};
pub use training::{TrainingOrder, TrainingPreference};
