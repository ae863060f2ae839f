//! Village Runner Library
//!
//! Autonomous account management for a browser strategy game: keeps the
//! account in sync, grows villages along a build order, trains a garrison,
//! sends the hero on adventures and raids farm targets suggested by an
//! external advisor.

pub mod advisor;
pub mod config;
pub mod engine;
pub mod error;
pub mod farming;
pub mod game;
pub mod policy;
pub mod report;
pub mod shutdown;
pub mod sim;
pub mod timer;
pub mod types;


// Re-export main types for convenience
pub use advisor::{AdviceSource, HttpAdviceSource, RateLimitedAdvisor, TargetAdvisor};
pub use config::{EngineConfig, SecsRange};
pub use engine::{BotEngine, EngineHandle, EngineStatus, StopReason};
pub use error::{AdvisorError, ConfigError, EngineError, GameError, GameResult};
pub use farming::{FarmCandidate, FarmingManager, RaidCycleSummary, RaidDecision};
pub use game::GameInterface;
pub use report::{MemoryObserver, Notice, NoticeLevel, Observer, Reporter};
pub use shutdown::{stop_channel, StopHandle, StopSignal};
pub use sim::SimulatedGame;
pub use timer::{Clock, CooldownTimer, ManualClock, SystemClock};
pub use types::{Account, Coordinates, FarmTarget, Hero, Village};
