//! Adventure policy - send the hero out whenever an adventure is offered

use crate::types::Hero;

/// What to do with the hero on this check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdventureAction {
    /// Hero status has not been read
    NoHeroData,
    Dispatch,
    NothingAvailable,
}

/// Result of one adventure check, decides the next cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdventureOutcome {
    NoHeroData,
    Dispatched,
    DispatchFailed,
    NothingAvailable,
}

/// Which configured cooldown range follows an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownKind {
    Initial,
    Success,
    Fail,
}

pub fn decide(hero: Option<&Hero>) -> AdventureAction {
    match hero {
        None => AdventureAction::NoHeroData,
        Some(hero) if hero.adventure_available => AdventureAction::Dispatch,
        Some(_) => AdventureAction::NothingAvailable,
    }
}

impl AdventureOutcome {
    pub fn cooldown(self) -> CooldownKind {
        match self {
            AdventureOutcome::Dispatched => CooldownKind::Success,
            AdventureOutcome::NothingAvailable => CooldownKind::Initial,
            AdventureOutcome::NoHeroData | AdventureOutcome::DispatchFailed => CooldownKind::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeroStatus;

    #[test]
    fn test_decide() {
        let ready = Hero::new(90, 10, HeroStatus::AtHome, true);
        let idle = Hero::new(90, 10, HeroStatus::AtHome, false);

        assert_eq!(decide(None), AdventureAction::NoHeroData);
        assert_eq!(decide(Some(&ready)), AdventureAction::Dispatch);
        assert_eq!(decide(Some(&idle)), AdventureAction::NothingAvailable);
    }

    #[test]
    fn test_outcome_cooldowns() {
        assert_eq!(AdventureOutcome::Dispatched.cooldown(), CooldownKind::Success);
        assert_eq!(AdventureOutcome::NothingAvailable.cooldown(), CooldownKind::Initial);
        assert_eq!(AdventureOutcome::DispatchFailed.cooldown(), CooldownKind::Fail);
        assert_eq!(AdventureOutcome::NoHeroData.cooldown(), CooldownKind::Fail);
    }
}
