//! 卡牌目录与内置标准卡组。

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::card::{CardTemplate, CostModifier, Rarity, TemplateId};
use super::effects::{EffectDescriptor, EffectKind, EffectTiming, TargetType};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardCatalog {
    templates: BTreeMap<TemplateId, Arc<CardTemplate>>,
}

impl CardCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_templates(templates: impl IntoIterator<Item = CardTemplate>) -> Self {
        let mut catalog = Self::new();
        for template in templates {
            catalog.insert(template);
        }
        catalog
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let templates: Vec<CardTemplate> = serde_json::from_str(json)?;
        Ok(Self::from_templates(templates))
    }

    pub fn insert(&mut self, template: CardTemplate) -> Arc<CardTemplate> {
        let template = Arc::new(template);
        self.templates.insert(template.id, Arc::clone(&template));
        template
    }

    pub fn get(&self, id: TemplateId) -> Option<Arc<CardTemplate>> {
        self.templates.get(&id).cloned()
    }

    pub fn contains(&self, id: TemplateId) -> bool {
        self.templates.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CardTemplate>> {
        self.templates.values()
    }

    /// 可被发现的卡牌（排除衍生物）。
    pub fn collectible(&self) -> Vec<TemplateId> {
        self.templates
            .values()
            .filter(|template| template.collectible)
            .map(|template| template.id)
            .collect()
    }

    pub fn resolve(&self, ids: &[TemplateId]) -> Option<Vec<Arc<CardTemplate>>> {
        ids.iter().map(|id| self.get(*id)).collect()
    }
}

pub const DAMAGED_GOLEM: TemplateId = 14;
pub const SHEEP: TemplateId = 24;
pub const MECH_ENGINEER: TemplateId = 31;
/// 机械工程师随机给出的机械衍生牌。
pub const MECH_POOL: [TemplateId; 5] = [32, 33, 34, 35, 36];

static STANDARD: Lazy<Arc<CardCatalog>> = Lazy::new(|| Arc::new(build_standard()));

/// 内置标准卡牌目录。
pub fn standard_catalog() -> Arc<CardCatalog> {
    Arc::clone(&STANDARD)
}

/// 两套示例卡组，均只引用标准目录中的卡牌。
pub fn sample_decks() -> [Vec<TemplateId>; 2] {
    let mage = vec![
        1, 1, 2, 2, 4, 4, 5, 5, 6, 6, 7, 8, 8, 10, 12, 15, 15, 17, 18, 23, 26, 27, 30, 30,
    ];
    let warrior = vec![
        1, 2, 3, 3, 4, 5, 9, 11, 11, 13, 13, 16, 19, 19, 20, 21, 22, 25, 28, 29, 29, 30, 5, 2,
    ];
    [mage, warrior]
}

fn build_standard() -> CardCatalog {
    let single = TargetType::SingleTarget;
    CardCatalog::from_templates([
        CardTemplate::creature(1, "River Crocolisk", 2, 2, 3),
        CardTemplate::creature(2, "Bloodfen Raptor", 2, 3, 2),
        CardTemplate::creature(3, "Shieldbearer", 1, 0, 4).with_taunt(),
        CardTemplate::creature(4, "Bluegill Warrior", 2, 2, 1).with_charge(),
        CardTemplate::creature(5, "Chillwind Yeti", 4, 4, 5),
        CardTemplate::spell(6, "Fireball", 4).with_effect(EffectDescriptor::new(EffectKind::Damage, single, 6)),
        CardTemplate::spell(7, "Arcane Intellect", 3)
            .with_effect(EffectDescriptor::new(EffectKind::DrawCard, TargetType::None, 2)),
        CardTemplate::spell(8, "Frostbolt", 2)
            .with_effect(EffectDescriptor::new(EffectKind::Damage, single, 3))
            .with_effect(EffectDescriptor::new(EffectKind::Freeze, single, 0)),
        CardTemplate::spell(9, "Consecration", 4)
            .with_effect(EffectDescriptor::new(EffectKind::Damage, TargetType::AllEnemies, 2))
            .with_effect(EffectDescriptor::new(EffectKind::Damage, TargetType::EnemyHero, 2)),
        CardTemplate::spell(10, "Whirlwind", 1)
            .with_effect(EffectDescriptor::new(EffectKind::DamageAll, TargetType::None, 1)),
        CardTemplate::creature(11, "Berserker", 3, 2, 4)
            .with_rarity(Rarity::Rare)
            .with_effect(
                EffectDescriptor::new(EffectKind::BuffAttack, TargetType::SelfCard, 2)
                    .with_timing(EffectTiming::WhenDamaged),
            ),
        CardTemplate::creature(12, "Arcane Giant", 12, 8, 8)
            .with_rarity(Rarity::Epic)
            .with_cost_modifier(CostModifier::PerSpellCast),
        CardTemplate::creature(13, "Harvest Golem", 3, 2, 3).with_effect(
            EffectDescriptor::new(EffectKind::Summon, TargetType::None, 0)
                .with_card(DAMAGED_GOLEM)
                .with_timing(EffectTiming::OnDeath),
        ),
        CardTemplate::creature(DAMAGED_GOLEM, "Damaged Golem", 1, 2, 1).token(),
        CardTemplate::creature(15, "Mana Wyrm", 1, 1, 3).with_effect(
            EffectDescriptor::new(EffectKind::BuffAttack, TargetType::SelfCard, 1)
                .with_timing(EffectTiming::WhenSpellCast),
        ),
        CardTemplate::spell(16, "Mind Control", 10)
            .with_rarity(Rarity::Epic)
            .with_effect(EffectDescriptor::new(EffectKind::MindControl, single, 0)),
        CardTemplate::spell(17, "Silence", 0)
            .with_effect(EffectDescriptor::new(EffectKind::Silence, single, 0)),
        CardTemplate::spell(18, "Arcane Insight", 1)
            .with_effect(EffectDescriptor::new(EffectKind::Discover, TargetType::None, 0)),
        CardTemplate::creature(19, "Adaptive Raptor", 3, 3, 3)
            .with_effect(EffectDescriptor::new(EffectKind::Adapt, TargetType::SelfCard, 0)),
        CardTemplate::spell(20, "Bloodlust", 5).with_effect(
            EffectDescriptor::new(EffectKind::BuffAllAttack, TargetType::AllAllies, 3).temporary(1),
        ),
        CardTemplate::spell(21, "Blessing of Kings", 4)
            .with_effect(EffectDescriptor::new(EffectKind::BuffAttack, single, 4))
            .with_effect(EffectDescriptor::new(EffectKind::BuffHealth, single, 4)),
        CardTemplate::spell(22, "Healing Touch", 3)
            .with_effect(EffectDescriptor::new(EffectKind::Heal, single, 8)),
        CardTemplate::spell(23, "Time Bomb", 2).with_effect(
            EffectDescriptor::new(EffectKind::DelayedEffect, TargetType::None, 0)
                .with_duration(2)
                .with_delayed(EffectDescriptor::new(EffectKind::Damage, TargetType::EnemyHero, 5)),
        ),
        CardTemplate::creature(SHEEP, "Sheep", 1, 1, 1).token(),
        CardTemplate::spell(25, "Mirror Entity", 3)
            .with_rarity(Rarity::Rare)
            .with_effect(EffectDescriptor::new(EffectKind::SummonCopy, single, 0)),
        CardTemplate::spell(26, "Innervate", 0)
            .with_effect(EffectDescriptor::new(EffectKind::GainMana, TargetType::None, 2)),
        CardTemplate::creature(27, "Crazed Alchemist", 2, 2, 2)
            .with_rarity(Rarity::Rare)
            .with_effect(EffectDescriptor::new(EffectKind::SwapAttackHealth, single, 0)),
        CardTemplate::spell(28, "Assassinate", 5)
            .with_effect(EffectDescriptor::new(EffectKind::DestroyCreature, single, 0)),
        CardTemplate::creature(29, "Fen Creeper", 5, 3, 6).with_taunt(),
        CardTemplate::creature(30, "Novice Engineer", 2, 1, 1)
            .with_effect(EffectDescriptor::new(EffectKind::DrawCard, TargetType::None, 1)),
        CardTemplate::creature(MECH_ENGINEER, "Mech Engineer", 2, 1, 1).with_effect(
            EffectDescriptor::new(EffectKind::AddRandomCard, TargetType::None, 0).with_pool(MECH_POOL),
        ),
        CardTemplate::creature(32, "Clockwork Gnome", 1, 2, 1).token(),
        CardTemplate::creature(33, "Annoy-o-Tron", 2, 1, 2).with_taunt().token(),
        CardTemplate::creature(34, "Spider Tank", 3, 3, 4).token(),
        CardTemplate::creature(35, "Piloted Shredder", 4, 4, 3).token(),
        CardTemplate::creature(36, "Mechanical Yeti", 4, 4, 5).token(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_decks_resolve_against_standard_catalog() {
        let catalog = standard_catalog();
        for deck in sample_decks() {
            let resolved = catalog.resolve(&deck).expect("every id is in the catalog");
            assert_eq!(resolved.len(), deck.len());
        }
    }

    #[test]
    fn tokens_are_not_collectible() {
        let catalog = standard_catalog();
        let collectible = catalog.collectible();
        assert!(!collectible.contains(&DAMAGED_GOLEM));
        assert!(!collectible.contains(&SHEEP));
        assert!(MECH_POOL.iter().all(|id| !collectible.contains(id)));
        assert!(collectible.contains(&MECH_ENGINEER));
        assert!(collectible.contains(&6));
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let catalog = standard_catalog();
        let templates: Vec<CardTemplate> = catalog.iter().map(|t| (**t).clone()).collect();
        let json = serde_json::to_string(&templates).expect("serialize");
        let parsed = CardCatalog::from_json(&json).expect("parse");
        assert_eq!(parsed.len(), catalog.len());
        assert_eq!(parsed.get(13), catalog.get(13));
    }
}
