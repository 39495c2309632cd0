pub mod action;
pub mod battle;
pub mod challenge;
pub mod character;
pub mod combatant;
pub mod error;
pub mod net;
pub mod player;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::character::{CharacterClass, CharacterSheet, Item, StatBlock};
    use crate::combatant::Combatant;

    /// A fresh level 1 sheet stocked with one of each potion.
    pub fn make_sheet(name: &str, class: CharacterClass) -> CharacterSheet {
        let mut sheet = CharacterSheet::new(name, class);
        sheet.inventory.add_item(Item::health_potion(), 1);
        sheet.inventory.add_item(Item::mana_potion(), 1);
        sheet
    }

    /// A sheet with hand-picked fighting stats, for scripted duels.
    pub fn make_custom_sheet(
        name: &str,
        class: CharacterClass,
        health: u32,
        attack: u32,
        defense: u32,
    ) -> CharacterSheet {
        let mut sheet = make_sheet(name, class);
        sheet.base = StatBlock::new(health, 50, attack, defense, 10);
        sheet.health = health;
        sheet.mana = 50;
        sheet
    }

    /// A combatant with hand-picked health, attack and defense.
    pub fn make_combatant(
        name: &str,
        class: CharacterClass,
        health: u32,
        attack: u32,
        defense: u32,
    ) -> Combatant {
        Combatant::from_sheet(&make_custom_sheet(name, class, health, attack, defense))
    }
}
