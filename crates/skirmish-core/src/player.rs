use serde::{Deserialize, Serialize};

use crate::character::{CharacterClass, CharacterSheet};

/// Server-assigned identity of a connected session.
pub type PlayerId = u64;

/// Public listing entry for an online player with a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub class: CharacterClass,
    pub level: u32,
}

impl PlayerSummary {
    pub fn from_sheet(id: PlayerId, sheet: &CharacterSheet) -> Self {
        Self {
            id,
            name: sheet.name.clone(),
            class: sheet.class,
            level: sheet.level,
        }
    }
}
