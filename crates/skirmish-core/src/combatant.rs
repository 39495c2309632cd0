use serde::{Deserialize, Serialize};

use crate::character::{CharacterClass, CharacterSheet, Inventory, Skill};

/// Battle-scoped snapshot of a character's fighting stats.
///
/// Health and mana are clamped to `[0, max]` by every mutator; none of them
/// can fail or panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub name: String,
    pub class: CharacterClass,
    pub level: u32,
    pub health: u32,
    pub max_health: u32,
    pub mana: u32,
    pub max_mana: u32,
    pub attack: u32,
    pub defense: u32,
    pub skills: Vec<Skill>,
    pub inventory: Inventory,
    /// Names of items used up during this battle, one entry per unit.
    pub consumed: Vec<String>,
}

impl Combatant {
    /// Snapshot a live character sheet (equipment bonuses included).
    pub fn from_sheet(sheet: &CharacterSheet) -> Self {
        let total = sheet.total_stats();
        Self {
            name: sheet.name.clone(),
            class: sheet.class,
            level: sheet.level.max(1),
            health: sheet.health.min(total.health),
            max_health: total.health,
            mana: sheet.mana.min(total.mana),
            max_mana: total.mana,
            attack: total.attack,
            defense: total.defense,
            skills: sheet.skills.clone(),
            inventory: sheet.inventory.clone(),
            consumed: Vec::new(),
        }
    }

    /// Apply incoming damage after defense. Always deals at least 1.
    /// Returns the damage actually dealt.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.saturating_sub(self.defense).max(1);
        self.health = self.health.saturating_sub(actual);
        actual
    }

    pub fn heal(&mut self, amount: u32) {
        self.health = self.health.saturating_add(amount).min(self.max_health);
    }

    /// Spend mana if enough is available. On false nothing changes.
    pub fn use_mana(&mut self, amount: u32) -> bool {
        if self.mana >= amount {
            self.mana -= amount;
            true
        } else {
            false
        }
    }

    pub fn restore_mana(&mut self, amount: u32) {
        self.mana = self.mana.saturating_add(amount).min(self.max_mana);
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn skill(&self, name: &str) -> Option<&Skill> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// Remove one unit of an item, remembering it for write-back.
    pub(crate) fn consume_item(&mut self, name: &str) -> bool {
        if self.inventory.remove_item(name, 1) {
            self.consumed.push(name.to_string());
            true
        } else {
            false
        }
    }
}
