//! 需要玩家选择的效果（发现、进化）的挂起与续行。

use serde::{Deserialize, Serialize};

use super::card::{CardInstance, InstanceId, TemplateId};
use super::effects::{EffectContext, EffectDescriptor};
use super::state::PlayerId;

pub type ChoiceToken = u64;

/// 进化的可选项。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdaptOption {
    DivineShield,
    PlusThreeAttack,
    PlusThreeHealth,
    Taunt,
    Stealth,
}

impl AdaptOption {
    pub const ALL: [AdaptOption; 5] = [
        AdaptOption::DivineShield,
        AdaptOption::PlusThreeAttack,
        AdaptOption::PlusThreeHealth,
        AdaptOption::Taunt,
        AdaptOption::Stealth,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AdaptOption::DivineShield => "Divine Shield",
            AdaptOption::PlusThreeAttack => "+3 Attack",
            AdaptOption::PlusThreeHealth => "+3 Health",
            AdaptOption::Taunt => "Taunt",
            AdaptOption::Stealth => "Stealth",
        }
    }

    pub fn apply(self, card: &mut CardInstance) {
        match self {
            AdaptOption::DivineShield => card.is_divine = true,
            AdaptOption::PlusThreeAttack => card.buff_attack(3),
            AdaptOption::PlusThreeHealth => card.buff_health(3),
            AdaptOption::Taunt => card.is_taunting = true,
            AdaptOption::Stealth => card.is_stealth = true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ChoiceKind {
    Discover {
        options: Vec<TemplateId>,
    },
    Adapt {
        /// 目标离场后置空，选择仍可完成但不产生效果。
        target: Option<InstanceId>,
        options: Vec<AdaptOption>,
    },
}

impl ChoiceKind {
    pub fn option_count(&self) -> usize {
        match self {
            ChoiceKind::Discover { options } => options.len(),
            ChoiceKind::Adapt { options, .. } => options.len(),
        }
    }
}

/// 挂起中的效果序列：选择完成后从 `resume` 继续执行。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingChoice {
    pub token: ChoiceToken,
    pub owner: PlayerId,
    pub kind: ChoiceKind,
    pub context: EffectContext,
    #[serde(default)]
    pub resume: Vec<EffectDescriptor>,
}

impl PendingChoice {
    pub fn release_target(&mut self, id: InstanceId) {
        if let ChoiceKind::Adapt { target, .. } = &mut self.kind {
            if *target == Some(id) {
                *target = None;
            }
        }
    }

    pub fn is_valid_option(&self, option: usize) -> bool {
        option < self.kind.option_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releasing_adapt_target_clears_lock() {
        let mut choice = PendingChoice {
            token: 1,
            owner: 0,
            kind: ChoiceKind::Adapt {
                target: Some(7),
                options: AdaptOption::ALL.to_vec(),
            },
            context: EffectContext::new(0),
            resume: Vec::new(),
        };
        choice.release_target(3);
        assert!(matches!(choice.kind, ChoiceKind::Adapt { target: Some(7), .. }));
        choice.release_target(7);
        assert!(matches!(choice.kind, ChoiceKind::Adapt { target: None, .. }));
        assert!(choice.is_valid_option(4));
        assert!(!choice.is_valid_option(5));
    }
}
