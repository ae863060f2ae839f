//! Training policy - keep a minimum garrison per unit type

use serde::{Deserialize, Serialize};

use crate::types::Village;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPreference {
    pub unit_type: String,
    /// Keep at least this many at home
    pub min_count: u32,
    /// Never queue more than this many at once
    pub batch_size: u32,
}

pub fn default_training_preferences() -> Vec<TrainingPreference> {
    vec![TrainingPreference {
        unit_type: "Legionnaire".to_string(),
        min_count: 10,
        batch_size: 5,
    }]
}

/// A training request for one unit type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingOrder {
    pub unit_type: String,
    pub amount: u32,
    pub current: u32,
    pub min_count: u32,
}

/// Orders for every preference that is below its minimum, in preference order
pub fn plan(village: &Village, preferences: &[TrainingPreference]) -> Vec<TrainingOrder> {
    preferences
        .iter()
        .filter_map(|pref| {
            let current = village.troop_count(&pref.unit_type);
            let deficit = pref.min_count.saturating_sub(current);
            let amount = deficit.min(pref.batch_size);
            (amount > 0).then(|| TrainingOrder {
                unit_type: pref.unit_type.clone(),
                amount,
                current,
                min_count: pref.min_count,
            })
        })
        .collect()
}
