//! 战斗结算：攻击合法性、嘲讽限制与同时伤害交换。

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::card::{AttackReadiness, InstanceId};
use super::effects::EffectEngine;
use super::rules::RuleError;
use super::state::{opponent, GameEvent, GameState, PlayerId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type")]
pub enum AttackTarget {
    Hero,
    Creature { id: InstanceId },
}

/// 已宣告、待回合结束统一结算的攻击。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAttack {
    pub player_id: PlayerId,
    pub attacker: InstanceId,
    pub target: AttackTarget,
}

impl PendingAttack {
    pub fn references(&self, id: InstanceId) -> bool {
        self.attacker == id || self.target == AttackTarget::Creature { id }
    }
}

/// 检查攻击者与目标；不修改状态。
pub fn validate_attack(
    state: &GameState,
    player_id: PlayerId,
    attacker: InstanceId,
    target: AttackTarget,
) -> Result<(), RuleError> {
    if state.is_finished() {
        return Err(RuleError::GameFinished);
    }
    if player_id != state.active_player {
        return Err(RuleError::NotPlayerTurn { player_id });
    }
    let player = state
        .get_player(player_id)
        .ok_or(RuleError::PlayerNotFound { player_id })?;
    let card = player
        .field
        .find(attacker)
        .ok_or(RuleError::AttackerNotFound {
            instance_id: attacker,
        })?;
    if !card.is_creature() {
        return Err(RuleError::NotACreature {
            instance_id: attacker,
        });
    }
    let readiness = card.readiness();
    if readiness != AttackReadiness::Ready {
        return Err(RuleError::AttackerNotReady {
            instance_id: attacker,
            readiness,
        });
    }

    let defender = &state.player(opponent(player_id)).field;
    match target {
        AttackTarget::Hero => {
            if defender.has_taunt() {
                return Err(RuleError::TauntBlocks);
            }
        }
        AttackTarget::Creature { id } => {
            let defending = defender
                .find(id)
                .ok_or(RuleError::InvalidAttackTarget { target })?;
            if defender.has_taunt() && !defending.is_taunting {
                return Err(RuleError::TauntBlocks);
            }
        }
    }
    Ok(())
}

/// 可攻击的目标：有嘲讽时只能攻击嘲讽生物。
pub fn legal_attack_targets(state: &GameState, player_id: PlayerId, attacker: InstanceId) -> Vec<AttackTarget> {
    let mut candidates = vec![AttackTarget::Hero];
    candidates.extend(
        state
            .player(opponent(player_id))
            .field
            .ids()
            .into_iter()
            .map(|id| AttackTarget::Creature { id }),
    );
    candidates
        .into_iter()
        .filter(|target| validate_attack(state, player_id, attacker, *target).is_ok())
        .collect()
}

pub fn ready_attackers(state: &GameState, player_id: PlayerId) -> Vec<InstanceId> {
    state
        .get_player(player_id)
        .map(|player| {
            player
                .field
                .creatures()
                .filter(|card| card.readiness() == AttackReadiness::Ready)
                .map(|card| card.id)
                .collect()
        })
        .unwrap_or_default()
}

/// 执行一次已验证的攻击：双方伤害先全部结算，再统一检查死亡。
pub fn execute_attack(
    engine: &mut EffectEngine,
    state: &mut GameState,
    attacker: InstanceId,
    target: AttackTarget,
) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let Some(card) = state.creature_mut(attacker) else {
        return events;
    };
    card.has_attacked_this_turn = true;
    let attack = card.current_attack;
    let owner = card.owner;
    debug!(attacker, ?target, attack, "attack");

    match target {
        AttackTarget::Hero => {
            events.extend(state.damage_hero(opponent(owner), attack, Some(attacker)));
        }
        AttackTarget::Creature { id } => {
            let Some(retaliation) = state.creature(id).map(|defender| defender.current_attack) else {
                return events;
            };
            events.extend(engine.damage_creature(state, id, attack, Some(attacker)));
            events.extend(engine.damage_creature(state, attacker, retaliation, Some(id)));
        }
    }
    events.extend(engine.settle(state));
    events
}
