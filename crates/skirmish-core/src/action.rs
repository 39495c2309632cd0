use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::character::{HEALTH_POTION, ItemKind, MANA_POTION, SkillEffect};
use crate::combatant::Combatant;
use crate::error::PvpError;

/// Random bonus added to every basic attack: uniform in `[0, 5)`.
pub const ATTACK_ROLL_SIDES: u32 = 5;
pub const HEALTH_POTION_HEAL: u32 = 50;
pub const MANA_POTION_RESTORE: u32 = 30;

/// Source of the small uniform rolls used by damage and heal formulas.
pub trait Dice {
    /// A value in `[0, sides)`; 0 when `sides` is 0.
    fn roll(&mut self, sides: u32) -> u32;
}

/// Production dice backed by a `rand` generator.
pub struct RandomDice<R: Rng>(pub R);

impl RandomDice<StdRng> {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_os_rng())
    }
}

impl<R: Rng> Dice for RandomDice<R> {
    fn roll(&mut self, sides: u32) -> u32 {
        if sides == 0 {
            return 0;
        }
        self.0.random_range(0..sides)
    }
}

/// Dice that always lands on the same face (capped to the die size).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDice(pub u32);

impl Dice for FixedDice {
    fn roll(&mut self, sides: u32) -> u32 {
        self.0.min(sides.saturating_sub(1))
    }
}

/// Everything a combatant can do on their turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleAction {
    Attack,
    Skill { name: String },
    Item { name: String },
    Surrender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Damage,
    Heal,
    RestoreMana,
    Surrender,
}

/// Result of a successful action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub message: String,
    pub effect: EffectKind,
    pub magnitude: u32,
}

/// Resolve one action of `actor` against `target`.
///
/// Only the two combatants are mutated, and on error neither is.
pub fn resolve(
    action: &BattleAction,
    actor: &mut Combatant,
    target: &mut Combatant,
    dice: &mut dyn Dice,
) -> Result<ActionOutcome, PvpError> {
    match action {
        BattleAction::Attack => Ok(attack(actor, target, dice)),
        BattleAction::Skill { name } => cast_skill(actor, target, name, dice),
        BattleAction::Item { name } => use_item(actor, name),
        BattleAction::Surrender => Ok(surrender(actor)),
    }
}

pub fn attack(actor: &Combatant, target: &mut Combatant, dice: &mut dyn Dice) -> ActionOutcome {
    let damage = actor.attack.saturating_add(dice.roll(ATTACK_ROLL_SIDES));
    let dealt = target.take_damage(damage);
    ActionOutcome {
        message: format!("{} attacks {} for {dealt} damage!", actor.name, target.name),
        effect: EffectKind::Damage,
        magnitude: dealt,
    }
}

pub fn cast_skill(
    actor: &mut Combatant,
    target: &mut Combatant,
    skill_name: &str,
    dice: &mut dyn Dice,
) -> Result<ActionOutcome, PvpError> {
    let skill = actor
        .skill(skill_name)
        .cloned()
        .ok_or_else(|| PvpError::UnknownSkill(skill_name.to_string()))?;

    if !actor.use_mana(skill.mana_cost) {
        return Err(PvpError::InsufficientMana {
            skill: skill.name,
            cost: skill.mana_cost,
            available: actor.mana,
        });
    }

    let outcome = match skill.effect {
        SkillEffect::HealSelf { base, spread } => {
            let amount = base.saturating_add(dice.roll(spread));
            actor.heal(amount);
            ActionOutcome {
                message: format!("{} casts {} and heals for {amount} health!", actor.name, skill.name),
                effect: EffectKind::Heal,
                magnitude: amount,
            }
        },
        SkillEffect::Damage { base, spread } => {
            let dealt = target.take_damage(base.saturating_add(dice.roll(spread)));
            ActionOutcome {
                message: format!(
                    "{} casts {} on {} for {dealt} damage!",
                    actor.name, skill.name, target.name
                ),
                effect: EffectKind::Damage,
                magnitude: dealt,
            }
        },
        SkillEffect::AttackMultiplier { factor } => {
            let dealt = target.take_damage(actor.attack.saturating_mul(factor));
            ActionOutcome {
                message: format!(
                    "{} uses {} on {} for {dealt} damage!",
                    actor.name, skill.name, target.name
                ),
                effect: EffectKind::Damage,
                magnitude: dealt,
            }
        },
    };
    Ok(outcome)
}

pub fn use_item(actor: &mut Combatant, item_name: &str) -> Result<ActionOutcome, PvpError> {
    let Some(item) = actor.inventory.item(item_name) else {
        return Err(PvpError::ItemNotOwned(item_name.to_string()));
    };
    if item.kind != ItemKind::Consumable {
        return Err(PvpError::ItemNotUsable(item_name.to_string()));
    }

    let outcome = match item_name {
        HEALTH_POTION => {
            actor.heal(HEALTH_POTION_HEAL);
            ActionOutcome {
                message: format!(
                    "{} uses {HEALTH_POTION} and restores {HEALTH_POTION_HEAL} health!",
                    actor.name
                ),
                effect: EffectKind::Heal,
                magnitude: HEALTH_POTION_HEAL,
            }
        },
        MANA_POTION => {
            actor.restore_mana(MANA_POTION_RESTORE);
            ActionOutcome {
                message: format!(
                    "{} uses {MANA_POTION} and restores {MANA_POTION_RESTORE} mana!",
                    actor.name
                ),
                effect: EffectKind::RestoreMana,
                magnitude: MANA_POTION_RESTORE,
            }
        },
        _ => return Err(PvpError::ItemNotUsable(item_name.to_string())),
    };

    actor.consume_item(item_name);
    Ok(outcome)
}

pub fn surrender(actor: &Combatant) -> ActionOutcome {
    ActionOutcome {
        message: format!("{} surrenders the battle!", actor.name),
        effect: EffectKind::Surrender,
        magnitude: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterClass, CharacterSheet, Item};

    fn pair(a: CharacterClass, b: CharacterClass) -> (Combatant, Combatant) {
        (
            Combatant::from_sheet(&CharacterSheet::new("Ann", a)),
            Combatant::from_sheet(&CharacterSheet::new("Bo", b)),
        )
    }

    #[test]
    fn fixed_dice_caps_to_sides() {
        let mut d = FixedDice(10);
        assert_eq!(d.roll(5), 4);
        assert_eq!(d.roll(0), 0);
        assert_eq!(FixedDice(2).roll(5), 2);
    }

    #[test]
    fn random_dice_stays_in_range() {
        let mut d = RandomDice(StdRng::seed_from_u64(7));
        for _ in 0..500 {
            assert!(d.roll(5) < 5);
        }
        assert_eq!(d.roll(0), 0);
    }

    #[test]
    fn huge_stats_saturate_instead_of_overflowing() {
        let (mut ann, mut bo) = pair(CharacterClass::Rogue, CharacterClass::Fighter);
        ann.attack = u32::MAX;
        let out = attack(&ann, &mut bo, &mut FixedDice(3));
        assert_eq!(out.magnitude, u32::MAX - bo.defense);
        assert_eq!(bo.health, 0);

        let mut bo = pair(CharacterClass::Fighter, CharacterClass::Fighter).1;
        let out = cast_skill(&mut ann, &mut bo, "Backstab", &mut FixedDice(0)).unwrap();
        assert_eq!(out.magnitude, u32::MAX - bo.defense);
    }

    #[test]
    fn attack_adds_roll_and_subtracts_defense() {
        let (ann, mut bo) = pair(CharacterClass::Fighter, CharacterClass::Mage);
        // 15 attack + 4 roll - 3 defense
        let out = attack(&ann, &mut bo, &mut FixedDice(4));
        assert_eq!(out.magnitude, 16);
        assert_eq!(out.effect, EffectKind::Damage);
        assert_eq!(bo.health, 64);
        assert!(out.message.contains("Ann attacks Bo for 16"));
    }

    #[test]
    fn unknown_skill_mutates_nothing() {
        let (mut ann, mut bo) = pair(CharacterClass::Fighter, CharacterClass::Mage);
        let before = (ann.clone(), bo.clone());
        let err = cast_skill(&mut ann, &mut bo, "Fireball", &mut FixedDice(0)).unwrap_err();
        assert_eq!(err, PvpError::UnknownSkill("Fireball".into()));
        assert_eq!((ann, bo), before);
    }

    #[test]
    fn insufficient_mana_mutates_nothing() {
        let (mut mage, mut bo) = pair(CharacterClass::Mage, CharacterClass::Fighter);
        mage.mana = 19;
        let before = (mage.clone(), bo.clone());
        let err = cast_skill(&mut mage, &mut bo, "Fireball", &mut FixedDice(0)).unwrap_err();
        assert!(matches!(
            err,
            PvpError::InsufficientMana {
                cost: 20,
                available: 19,
                ..
            }
        ));
        assert_eq!((mage, bo), before);
    }

    #[test]
    fn fireball_costs_mana_and_damages() {
        let (mut mage, mut fighter) = pair(CharacterClass::Mage, CharacterClass::Fighter);
        let out = cast_skill(&mut mage, &mut fighter, "Fireball", &mut FixedDice(14)).unwrap();
        // 25 + 14 - 8 defense
        assert_eq!(out.magnitude, 31);
        assert_eq!(mage.mana, 80);
        assert_eq!(fighter.health, 89);
    }

    #[test]
    fn heal_restores_caster() {
        let (mut cleric, mut bo) = pair(CharacterClass::Cleric, CharacterClass::Fighter);
        cleric.health = 20;
        let out = cast_skill(&mut cleric, &mut bo, "Heal", &mut FixedDice(0)).unwrap();
        assert_eq!(out.effect, EffectKind::Heal);
        assert_eq!(out.magnitude, 30);
        assert_eq!(cleric.health, 50);
        assert_eq!(cleric.mana, 65);
        assert_eq!(bo.health, 120);
    }

    #[test]
    fn backstab_is_deterministic() {
        let (mut rogue, mut mage) = pair(CharacterClass::Rogue, CharacterClass::Mage);
        let a = cast_skill(&mut rogue, &mut mage, "Backstab", &mut FixedDice(0)).unwrap();
        let b = cast_skill(&mut rogue, &mut mage, "Backstab", &mut FixedDice(99)).unwrap();
        // 12 * 2 - 3 defense
        assert_eq!(a.magnitude, 21);
        assert_eq!(b.magnitude, 21);
        assert_eq!(rogue.mana, 40);
    }

    #[test]
    fn potions_consumed_on_use() {
        let (mut ann, _) = pair(CharacterClass::Fighter, CharacterClass::Mage);
        ann.inventory.add_item(Item::health_potion(), 1);
        ann.inventory.add_item(Item::mana_potion(), 1);
        ann.health = 10;
        ann.mana = 0;

        let out = use_item(&mut ann, HEALTH_POTION).unwrap();
        assert_eq!(out.effect, EffectKind::Heal);
        assert_eq!(ann.health, 60);

        let out = use_item(&mut ann, MANA_POTION).unwrap();
        assert_eq!(out.effect, EffectKind::RestoreMana);
        assert_eq!(ann.mana, 30);

        assert_eq!(
            use_item(&mut ann, HEALTH_POTION).unwrap_err(),
            PvpError::ItemNotOwned(HEALTH_POTION.into())
        );
        assert_eq!(ann.consumed.len(), 2);
    }

    #[test]
    fn equipment_not_usable_in_battle() {
        let (mut ann, _) = pair(CharacterClass::Fighter, CharacterClass::Mage);
        let before = ann.clone();
        assert_eq!(
            use_item(&mut ann, "Iron Sword").unwrap_err(),
            PvpError::ItemNotUsable("Iron Sword".into())
        );
        assert_eq!(ann, before);
    }

    #[test]
    fn resolve_dispatches_every_variant() {
        let (mut ann, mut bo) = pair(CharacterClass::Fighter, CharacterClass::Cleric);
        let mut dice = FixedDice(0);
        let out = resolve(&BattleAction::Attack, &mut ann, &mut bo, &mut dice).unwrap();
        assert_eq!(out.effect, EffectKind::Damage);
        let out = resolve(&BattleAction::Surrender, &mut ann, &mut bo, &mut dice).unwrap();
        assert_eq!(out.effect, EffectKind::Surrender);
        assert!(
            resolve(
                &BattleAction::Skill {
                    name: "Heal".into()
                },
                &mut ann,
                &mut bo,
                &mut dice
            )
            .is_err()
        );
        assert!(
            resolve(
                &BattleAction::Item {
                    name: "Elixir".into()
                },
                &mut ann,
                &mut bo,
                &mut dice
            )
            .is_err()
        );
    }
}
