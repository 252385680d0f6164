//! 卡牌模板（只读）与运行时卡牌实例。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::effects::{EffectDescriptor, EffectTiming};
use super::state::PlayerId;

/// 卡牌模板标识。
pub type TemplateId = u32;
/// 运行时实例标识，一局内唯一。
pub type InstanceId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CardType {
    #[default]
    Creature,
    Spell,
    Item,
    Enchantment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Rarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Keywords {
    #[serde(default)]
    pub charge: bool,
    #[serde(default)]
    pub taunt: bool,
}

/// 费用修正规则。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CostModifier {
    /// 本局每施放一个法术，费用减一（最低为 0）。
    PerSpellCast,
}

/// 卡牌模板，由卡牌目录持有，所有实例共享。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardTemplate {
    pub id: TemplateId,
    pub name: String,
    pub cost: u8,
    #[serde(default)]
    pub card_type: CardType,
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub health: i32,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<EffectDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_modifier: Option<CostModifier>,
    #[serde(default = "default_collectible")]
    pub collectible: bool,
}

fn default_collectible() -> bool {
    true
}

impl CardTemplate {
    pub fn new(
        id: TemplateId,
        name: impl Into<String>,
        cost: u8,
        card_type: CardType,
        attack: i32,
        health: i32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            cost,
            card_type,
            attack,
            health,
            keywords: Keywords::default(),
            rarity: Rarity::default(),
            effects: Vec::new(),
            cost_modifier: None,
            collectible: true,
        }
    }

    pub fn creature(id: TemplateId, name: impl Into<String>, cost: u8, attack: i32, health: i32) -> Self {
        Self::new(id, name, cost, CardType::Creature, attack, health)
    }

    pub fn spell(id: TemplateId, name: impl Into<String>, cost: u8) -> Self {
        Self::new(id, name, cost, CardType::Spell, 0, 0)
    }

    pub fn with_charge(mut self) -> Self {
        self.keywords.charge = true;
        self
    }

    pub fn with_taunt(mut self) -> Self {
        self.keywords.taunt = true;
        self
    }

    pub fn with_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = rarity;
        self
    }

    pub fn with_effect(mut self, effect: EffectDescriptor) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_cost_modifier(mut self, modifier: CostModifier) -> Self {
        self.cost_modifier = Some(modifier);
        self
    }

    pub fn token(mut self) -> Self {
        self.collectible = false;
        self
    }

    pub fn is_creature(&self) -> bool {
        self.card_type == CardType::Creature
    }

    pub fn immediate_effects(&self) -> impl Iterator<Item = &EffectDescriptor> {
        self.effects
            .iter()
            .filter(|effect| effect.timing == EffectTiming::Immediate)
    }

    pub fn triggered_effects(&self) -> impl Iterator<Item = &EffectDescriptor> {
        self.effects
            .iter()
            .filter(|effect| effect.timing != EffectTiming::Immediate)
    }

    /// 根据本局已施放的法术数量计算实际费用。
    pub fn effective_cost(&self, spells_cast_this_game: u32) -> u8 {
        match self.cost_modifier {
            Some(CostModifier::PerSpellCast) => {
                let reduction = spells_cast_this_game.min(u8::MAX as u32) as u8;
                self.cost.saturating_sub(reduction)
            }
            None => self.cost,
        }
    }
}

/// 生物的本回合攻击状态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttackReadiness {
    Dormant,
    Ready,
    Spent,
    Frozen,
}

/// 对局中的卡牌实例。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInstance {
    pub id: InstanceId,
    pub template: Arc<CardTemplate>,
    pub owner: PlayerId,
    pub current_attack: i32,
    /// 生命上限，增益会提高它，治疗以它为上限。
    pub max_health: i32,
    pub current_health: i32,
    #[serde(default)]
    pub can_attack_this_turn: bool,
    #[serde(default)]
    pub has_attacked_this_turn: bool,
    #[serde(default)]
    pub has_charge: bool,
    #[serde(default)]
    pub is_taunting: bool,
    #[serde(default)]
    pub is_divine: bool,
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(default)]
    pub is_stealth: bool,
}

impl CardInstance {
    pub fn instantiate(id: InstanceId, template: Arc<CardTemplate>, owner: PlayerId) -> Self {
        let attack = template.attack;
        let health = template.health;
        Self {
            id,
            template,
            owner,
            current_attack: attack,
            max_health: health,
            current_health: health,
            can_attack_this_turn: false,
            has_attacked_this_turn: false,
            has_charge: false,
            is_taunting: false,
            is_divine: false,
            is_frozen: false,
            is_stealth: false,
        }
    }

    /// 复制当前（可能已增益的）数值，回合相关状态重置。
    pub fn copy(&self, id: InstanceId, owner: PlayerId) -> Self {
        Self {
            id,
            template: Arc::clone(&self.template),
            owner,
            current_attack: self.current_attack,
            max_health: self.max_health,
            current_health: self.current_health,
            can_attack_this_turn: false,
            has_attacked_this_turn: false,
            has_charge: self.has_charge,
            is_taunting: self.is_taunting,
            is_divine: self.is_divine,
            is_frozen: false,
            is_stealth: self.is_stealth,
        }
    }

    pub fn template_id(&self) -> TemplateId {
        self.template.id
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn is_creature(&self) -> bool {
        self.template.is_creature()
    }

    pub fn is_dead(&self) -> bool {
        self.current_health <= 0
    }

    /// 进入战场：关键字生效，冲锋生物本回合即可攻击。复制体保留已有状态。
    pub fn enter_field(&mut self) {
        self.has_charge |= self.template.keywords.charge;
        self.is_taunting |= self.template.keywords.taunt;
        self.can_attack_this_turn = self.has_charge;
        self.has_attacked_this_turn = false;
    }

    pub fn readiness(&self) -> AttackReadiness {
        if self.is_frozen {
            AttackReadiness::Frozen
        } else if self.has_attacked_this_turn {
            AttackReadiness::Spent
        } else if self.can_attack_this_turn {
            AttackReadiness::Ready
        } else {
            AttackReadiness::Dormant
        }
    }

    pub fn refresh_for_turn(&mut self) {
        self.can_attack_this_turn = true;
        self.has_attacked_this_turn = false;
    }

    pub fn buff_attack(&mut self, amount: i32) {
        self.current_attack = self.current_attack.saturating_add(amount);
    }

    pub fn buff_health(&mut self, amount: i32) {
        self.max_health = self.max_health.saturating_add(amount);
        self.current_health = self.current_health.saturating_add(amount);
    }

    /// 撤销临时生命增益，当前生命不超过新的上限。
    pub fn revert_health_buff(&mut self, amount: i32) {
        self.max_health = self.max_health.saturating_sub(amount);
        self.current_health = self.current_health.min(self.max_health);
    }

    /// 返回实际恢复量。
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.current_health;
        self.current_health = self.current_health.saturating_add(amount).min(self.max_health).max(before);
        self.current_health - before
    }

    pub fn swap_attack_health(&mut self) {
        std::mem::swap(&mut self.current_attack, &mut self.current_health);
        self.max_health = self.current_health;
    }

    /// 沉默：数值回到模板基础值，清除全部状态。
    pub fn silence(&mut self) {
        self.current_attack = self.template.attack;
        self.max_health = self.template.health;
        self.current_health = self.template.health;
        self.has_charge = false;
        self.is_taunting = false;
        self.is_divine = false;
        self.is_frozen = false;
        self.is_stealth = false;
    }
}
