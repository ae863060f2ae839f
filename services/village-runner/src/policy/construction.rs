//! Construction policy - walk an ordered list of building goals

use serde::{Deserialize, Serialize};

use crate::types::{SlotId, Village};

/// Bring the building in `slot` up to `target_level`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildGoal {
    pub name: String,
    pub target_level: u32,
    #[serde(default)]
    pub slot: Option<SlotId>,
    #[serde(default)]
    pub type_id: Option<String>,
}

impl BuildGoal {
    pub fn new(name: &str, target_level: u32, type_id: &str, slot: &str) -> Self {
        Self {
            name: name.to_string(),
            target_level,
            slot: Some(slot.to_string()),
            type_id: Some(type_id.to_string()),
        }
    }
}

/// Starter build order for a fresh village
pub fn default_build_order() -> Vec<BuildGoal> {
    vec![
        BuildGoal::new("Woodcutter", 2, "1", "1"),
        BuildGoal::new("Cropland", 2, "4", "5"),
        BuildGoal::new("Clay Pit", 1, "2", "2"),
        BuildGoal::new("Iron Mine", 1, "3", "3"),
        BuildGoal::new("Main Building", 3, "15", "26"),
        BuildGoal::new("Granary", 2, "11", "22"),
        BuildGoal::new("Warehouse", 2, "10", "21"),
        BuildGoal::new("Barracks", 1, "19", "30"),
    ]
}

/// Outcome of checking one goal against a village
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalCheck<'a> {
    MissingSlot {
        goal: &'a BuildGoal,
    },
    /// The slot holds some other building
    Conflict {
        goal: &'a BuildGoal,
        slot: &'a str,
        found: String,
    },
    Reached {
        goal: &'a BuildGoal,
        level: u32,
    },
    Eligible {
        goal: &'a BuildGoal,
        slot: &'a str,
        current_level: u32,
    },
}

/// What construction should do in a village this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionPlan<'a> {
    /// The construction queue is at or over the limit
    QueueFull { active: usize, limit: usize },
    /// Every goal checked, in order
    Checks(Vec<GoalCheck<'a>>),
}

/// Check every goal against the village in order
pub fn plan<'a>(village: &Village, goals: &'a [BuildGoal], max_concurrent: usize) -> ConstructionPlan<'a> {
    let active = village.active_constructions();
    if active >= max_concurrent {
        return ConstructionPlan::QueueFull {
            active,
            limit: max_concurrent,
        };
    }

    ConstructionPlan::Checks(goals.iter().map(|goal| check_goal(village, goal)).collect())
}

fn check_goal<'a>(village: &Village, goal: &'a BuildGoal) -> GoalCheck<'a> {
    let slot = match goal.slot.as_deref() {
        Some(slot) if !slot.is_empty() => slot,
        _ => return GoalCheck::MissingSlot { goal },
    };

    let current_level = match village.building_in_slot(slot) {
        Some(building) => {
            if !building.is_empty_site() && !same_building(building, goal) {
                return GoalCheck::Conflict {
                    goal,
                    slot,
                    found: building.name.clone(),
                };
            }
            building.level
        }
        None => 0,
    };

    if current_level >= goal.target_level {
        GoalCheck::Reached {
            goal,
            level: current_level,
        }
    } else {
        GoalCheck::Eligible {
            goal,
            slot,
            current_level,
        }
    }
}

fn same_building(building: &crate::types::Building, goal: &BuildGoal) -> bool {
    match (building.type_id.as_deref(), goal.type_id.as_deref()) {
        (Some(found), Some(wanted)) => found == wanted,
        _ => building.name.eq_ignore_ascii_case(&goal.name),
    }
}
