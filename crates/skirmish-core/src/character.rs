use serde::{Deserialize, Serialize};

use crate::battle::Rewards;
use crate::error::PvpError;

/// Most skills a sheet may carry.
pub const MAX_SKILLS: usize = 8;
/// Most distinct items a sheet may carry.
pub const MAX_INVENTORY_SLOTS: usize = 16;
/// Largest stack of one item.
pub const MAX_STACK: u32 = 99;
/// Longest item or skill name, in characters.
pub const MAX_LABEL_LEN: usize = 48;
/// Longest item or skill description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 160;

/// Stats added to the base block on every level up.
const LEVEL_UP_GAINS: StatBlock = StatBlock::new(10, 5, 2, 1, 1);

/// Playable classes. Each class fixes the base stat template and the
/// starting skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Fighter,
    Mage,
    Rogue,
    Cleric,
}

impl CharacterClass {
    pub const ALL: [CharacterClass; 4] = [
        CharacterClass::Fighter,
        CharacterClass::Mage,
        CharacterClass::Rogue,
        CharacterClass::Cleric,
    ];

    /// Level 1 stats for the class. `health` and `mana` are maxima.
    pub fn base_stats(self) -> StatBlock {
        match self {
            Self::Fighter => StatBlock::new(120, 30, 15, 8, 8),
            Self::Mage => StatBlock::new(80, 100, 8, 3, 12),
            Self::Rogue => StatBlock::new(90, 60, 12, 5, 15),
            Self::Cleric => StatBlock::new(100, 80, 10, 6, 10),
        }
    }

    pub fn starting_skills(self) -> Vec<Skill> {
        match self {
            Self::Fighter => Vec::new(),
            Self::Mage => vec![Skill::fireball()],
            Self::Rogue => vec![Skill::backstab()],
            Self::Cleric => vec![Skill::heal()],
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fighter => "Fighter",
            Self::Mage => "Mage",
            Self::Rogue => "Rogue",
            Self::Cleric => "Cleric",
        };
        f.write_str(name)
    }
}

/// A bundle of additive stats, used both for class templates and for
/// equipment bonuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    pub health: u32,
    pub mana: u32,
    pub attack: u32,
    pub defense: u32,
    pub speed: u32,
}

impl StatBlock {
    pub const fn new(health: u32, mana: u32, attack: u32, defense: u32, speed: u32) -> Self {
        Self {
            health,
            mana,
            attack,
            defense,
            speed,
        }
    }
}

impl std::ops::Add for StatBlock {
    type Output = StatBlock;

    fn add(self, rhs: StatBlock) -> StatBlock {
        StatBlock {
            health: self.health.saturating_add(rhs.health),
            mana: self.mana.saturating_add(rhs.mana),
            attack: self.attack.saturating_add(rhs.attack),
            defense: self.defense.saturating_add(rhs.defense),
            speed: self.speed.saturating_add(rhs.speed),
        }
    }
}

// ================================================================
// Items
// ================================================================

pub const HEALTH_POTION: &str = "Health Potion";
pub const MANA_POTION: &str = "Mana Potion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Weapon,
    Armor,
    Accessory,
    Consumable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
    pub description: String,
    pub bonus: StatBlock,
    pub value: u32,
}

impl Item {
    fn new(name: &str, kind: ItemKind, description: &str, bonus: StatBlock, value: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            bonus,
            value,
        }
    }

    pub fn iron_sword() -> Self {
        Self::new(
            "Iron Sword",
            ItemKind::Weapon,
            "A sturdy iron sword",
            StatBlock::new(0, 0, 5, 0, 0),
            50,
        )
    }

    pub fn steel_armor() -> Self {
        Self::new(
            "Steel Armor",
            ItemKind::Armor,
            "Protective steel armor",
            StatBlock::new(20, 0, 0, 8, 0),
            100,
        )
    }

    pub fn magic_ring() -> Self {
        Self::new(
            "Magic Ring",
            ItemKind::Accessory,
            "A ring that enhances magical power",
            StatBlock::new(0, 30, 3, 0, 0),
            75,
        )
    }

    pub fn health_potion() -> Self {
        Self::new(
            HEALTH_POTION,
            ItemKind::Consumable,
            "Restores 50 health",
            StatBlock::default(),
            25,
        )
    }

    pub fn mana_potion() -> Self {
        Self::new(
            MANA_POTION,
            ItemKind::Consumable,
            "Restores 30 mana",
            StatBlock::default(),
            20,
        )
    }

    /// Every item the shop knows about.
    pub fn catalog() -> Vec<Item> {
        vec![
            Self::iron_sword(),
            Self::steel_armor(),
            Self::magic_ring(),
            Self::health_potion(),
            Self::mana_potion(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    pub item: Item,
    pub quantity: u32,
}

/// Stackable item storage plus the character's purse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub slots: Vec<InventorySlot>,
    pub gold: u32,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            gold: 100,
        }
    }
}

impl Inventory {
    pub fn add_item(&mut self, item: Item, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.slots.iter_mut().find(|s| s.item.name == item.name) {
            Some(slot) => slot.quantity = slot.quantity.saturating_add(quantity),
            None => self.slots.push(InventorySlot { item, quantity }),
        }
    }

    /// Remove `quantity` of the named item. Returns false (and changes
    /// nothing) if fewer than `quantity` are held.
    pub fn remove_item(&mut self, name: &str, quantity: u32) -> bool {
        let Some(index) = self.slots.iter().position(|s| s.item.name == name) else {
            return false;
        };
        if self.slots[index].quantity < quantity {
            return false;
        }
        self.slots[index].quantity -= quantity;
        if self.slots[index].quantity == 0 {
            self.slots.remove(index);
        }
        true
    }

    pub fn quantity(&self, name: &str) -> u32 {
        self.slots
            .iter()
            .find(|s| s.item.name == name)
            .map_or(0, |s| s.quantity)
    }

    pub fn has_item(&self, name: &str) -> bool {
        self.quantity(name) > 0
    }

    pub fn item(&self, name: &str) -> Option<&Item> {
        self.slots
            .iter()
            .find(|s| s.item.name == name)
            .map(|s| &s.item)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub weapon: Option<Item>,
    pub armor: Option<Item>,
    pub accessory: Option<Item>,
}

impl Equipment {
    /// Equip an item into its slot, returning whatever it replaced.
    /// Consumables are handed straight back.
    pub fn equip(&mut self, item: Item) -> Option<Item> {
        let slot = match item.kind {
            ItemKind::Weapon => &mut self.weapon,
            ItemKind::Armor => &mut self.armor,
            ItemKind::Accessory => &mut self.accessory,
            ItemKind::Consumable => return Some(item),
        };
        slot.replace(item)
    }

    pub fn stat_bonus(&self) -> StatBlock {
        [&self.weapon, &self.armor, &self.accessory]
            .into_iter()
            .flatten()
            .fold(StatBlock::default(), |acc, item| acc + item.bonus)
    }
}

// ================================================================
// Skills
// ================================================================

/// What a skill does when cast. Magnitudes are `base + roll[0, spread)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillEffect {
    HealSelf { base: u32, spread: u32 },
    Damage { base: u32, spread: u32 },
    /// Deterministic damage equal to the caster's attack times `factor`.
    AttackMultiplier { factor: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub mana_cost: u32,
    pub effect: SkillEffect,
}

impl Skill {
    pub fn heal() -> Self {
        Self {
            name: "Heal".to_string(),
            description: "Restores health".to_string(),
            mana_cost: 15,
            effect: SkillEffect::HealSelf {
                base: 30,
                spread: 20,
            },
        }
    }

    pub fn fireball() -> Self {
        Self {
            name: "Fireball".to_string(),
            description: "Deals fire damage".to_string(),
            mana_cost: 20,
            effect: SkillEffect::Damage {
                base: 25,
                spread: 15,
            },
        }
    }

    pub fn backstab() -> Self {
        Self {
            name: "Backstab".to_string(),
            description: "High damage sneak attack".to_string(),
            mana_cost: 10,
            effect: SkillEffect::AttackMultiplier { factor: 2 },
        }
    }
}

// ================================================================
// Character sheet
// ================================================================

/// The live, long-lived character a player brings into the lobby.
/// Battles take a [`Combatant`](crate::combatant::Combatant) snapshot of it
/// and write back only rewards and consumed items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub name: String,
    pub class: CharacterClass,
    pub level: u32,
    pub experience: u32,
    pub experience_to_next: u32,
    /// Base stats without equipment; `health`/`mana` are the maxima.
    pub base: StatBlock,
    pub health: u32,
    pub mana: u32,
    pub equipment: Equipment,
    pub inventory: Inventory,
    pub skills: Vec<Skill>,
}

impl CharacterSheet {
    pub fn new(name: impl Into<String>, class: CharacterClass) -> Self {
        let base = class.base_stats();
        let mut inventory = Inventory::default();
        if class == CharacterClass::Fighter {
            inventory.add_item(Item::iron_sword(), 1);
        }
        Self {
            name: name.into(),
            class,
            level: 1,
            experience: 0,
            experience_to_next: 100,
            base,
            health: base.health,
            mana: base.mana,
            equipment: Equipment::default(),
            inventory,
            skills: class.starting_skills(),
        }
    }

    /// Base stats plus equipment bonuses.
    pub fn total_stats(&self) -> StatBlock {
        self.base + self.equipment.stat_bonus()
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Add experience, levelling up once if the threshold is reached.
    /// Returns true on level up.
    pub fn gain_experience(&mut self, amount: u32) -> bool {
        self.experience = self.experience.saturating_add(amount);
        if self.experience >= self.experience_to_next {
            self.level_up();
            return true;
        }
        false
    }

    fn level_up(&mut self) {
        self.level = self.level.saturating_add(1);
        self.experience -= self.experience_to_next;
        self.experience_to_next = self.experience_to_next.saturating_mul(3) / 2;
        self.base = self.base + LEVEL_UP_GAINS;

        let total = self.total_stats();
        self.health = total.health;
        self.mana = total.mana;

        tracing::debug!(name = %self.name, level = self.level, "Character levelled up");
    }

    /// Check a client-supplied sheet against the size limits above. Stats
    /// are not range-checked; every stat computation saturates.
    pub fn validate(&self) -> Result<(), PvpError> {
        let invalid = |reason: String| Err(PvpError::InvalidCharacter(reason));

        if self.level == 0 {
            return invalid("level must be at least 1".to_string());
        }
        if self.skills.len() > MAX_SKILLS {
            return invalid(format!("at most {MAX_SKILLS} skills"));
        }
        if self.inventory.slots.len() > MAX_INVENTORY_SLOTS {
            return invalid(format!("at most {MAX_INVENTORY_SLOTS} inventory slots"));
        }
        if let Some(slot) = self.inventory.slots.iter().find(|s| s.quantity > MAX_STACK) {
            return invalid(format!("more than {MAX_STACK} of {}", slot.item.name));
        }

        let skill_text = self
            .skills
            .iter()
            .map(|s| (s.name.as_str(), s.description.as_str()));
        let equipped = [
            &self.equipment.weapon,
            &self.equipment.armor,
            &self.equipment.accessory,
        ];
        let item_text = self
            .inventory
            .slots
            .iter()
            .map(|s| &s.item)
            .chain(equipped.into_iter().flatten())
            .map(|i| (i.name.as_str(), i.description.as_str()));
        for (name, description) in skill_text.chain(item_text) {
            if name.is_empty() || name.chars().count() > MAX_LABEL_LEN {
                return invalid(format!("name must be 1 to {MAX_LABEL_LEN} characters"));
            }
            if description.chars().count() > MAX_DESCRIPTION_LEN {
                return invalid(format!(
                    "description of {name} is longer than {MAX_DESCRIPTION_LEN} characters"
                ));
            }
        }
        Ok(())
    }

    /// Credit a battle win. Returns true if the character levelled up.
    pub fn apply_rewards(&mut self, rewards: &Rewards) -> bool {
        self.inventory.gold = self.inventory.gold.saturating_add(rewards.gold);
        self.gain_experience(rewards.experience)
    }
}
