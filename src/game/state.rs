use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::card::{CardInstance, CardTemplate, InstanceId, TemplateId};
use super::catalog::CardCatalog;
use super::choice::{ChoiceKind, ChoiceToken, PendingChoice};
use super::combat::{AttackTarget, PendingAttack};
use super::effects::{DelayedEffect, TargetRef, TriggerRegistry, TurnStartHook};
use crate::config::GameConfig;

/// 玩家标识（0 为先手，1 为后手）。
pub type PlayerId = u8;

pub const PLAYER_ONE: PlayerId = 0;
pub const PLAYER_TWO: PlayerId = 1;

pub fn opponent(player: PlayerId) -> PlayerId {
    if player == PLAYER_ONE {
        PLAYER_TWO
    } else {
        PLAYER_ONE
    }
}

/// 固定大小的战场，空位显式保留。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Field {
    slots: Vec<Option<CardInstance>>,
}

impl Field {
    pub fn with_size(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Option<CardInstance>] {
        &self.slots
    }

    pub fn get(&self, slot: usize) -> Option<&CardInstance> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn is_free(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(None))
    }

    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.first_free().is_none()
    }

    /// 放入指定空位；位置被占用或越界时原样退回。
    pub fn place(&mut self, slot: usize, card: CardInstance) -> Result<(), CardInstance> {
        match self.slots.get_mut(slot) {
            Some(entry @ None) => {
                *entry = Some(card);
                Ok(())
            }
            _ => Err(card),
        }
    }

    pub fn take(&mut self, slot: usize) -> Option<CardInstance> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn position(&self, id: InstanceId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|card| card.id == id))
    }

    pub fn find(&self, id: InstanceId) -> Option<&CardInstance> {
        self.creatures().find(|card| card.id == id)
    }

    pub fn find_mut(&mut self, id: InstanceId) -> Option<&mut CardInstance> {
        self.creatures_mut().find(|card| card.id == id)
    }

    /// 从左到右的非空位置。
    pub fn creatures(&self) -> impl Iterator<Item = &CardInstance> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn creatures_mut(&mut self) -> impl Iterator<Item = &mut CardInstance> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.creatures().map(|card| card.id).collect()
    }

    pub fn count(&self) -> usize {
        self.creatures().count()
    }

    pub fn has_taunt(&self) -> bool {
        self.creatures().any(|card| card.is_taunting)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

/// 玩家状态：英雄生命、法力与四个区域。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub health: i32,
    pub max_mana: u8,
    pub current_mana: u8,
    /// 牌库，末尾为牌库顶。
    #[serde(default)]
    pub deck: Vec<CardInstance>,
    #[serde(default)]
    pub hand: Vec<CardInstance>,
    pub field: Field,
    #[serde(default)]
    pub graveyard: Vec<CardInstance>,
}

impl Player {
    pub fn new(id: PlayerId, config: &GameConfig) -> Self {
        Self {
            id,
            health: config.max_health,
            max_mana: config.starting_max_mana,
            current_mana: config.starting_max_mana,
            deck: Vec::new(),
            hand: Vec::new(),
            field: Field::with_size(config.max_field_size),
            graveyard: Vec::new(),
        }
    }

    pub fn find_in_hand(&self, id: InstanceId) -> Option<&CardInstance> {
        self.hand.iter().find(|card| card.id == id)
    }

    pub fn hand_index(&self, id: InstanceId) -> Option<usize> {
        self.hand.iter().position(|card| card.id == id)
    }

    pub fn remove_from_hand(&mut self, id: InstanceId) -> Option<CardInstance> {
        let idx = self.hand_index(id)?;
        Some(self.hand.remove(idx))
    }

    /// Fisher–Yates 洗牌。
    pub fn shuffle_deck<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.deck.shuffle(rng);
    }

    pub fn spend_mana(&mut self, amount: u8) {
        self.current_mana = self.current_mana.saturating_sub(amount);
    }

    pub fn gain_mana(&mut self, amount: u8) {
        self.current_mana = self.current_mana.saturating_add(amount).min(self.max_mana);
    }

    pub fn refill_mana(&mut self, cap: u8) {
        self.max_mana = self.max_mana.saturating_add(1).min(cap);
        self.current_mana = self.max_mana;
    }

    pub fn ready_field(&mut self) {
        for card in self.field.creatures_mut() {
            card.refresh_for_turn();
        }
    }

    fn all_instances(&self) -> impl Iterator<Item = &CardInstance> {
        self.deck
            .iter()
            .chain(self.hand.iter())
            .chain(self.field.creatures())
            .chain(self.graveyard.iter())
    }
}

/// 回合阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GamePhase {
    #[default]
    TurnStart,
    Main,
    TurnEnd,
    GameOver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OutcomeReason {
    HeroDefeated { loser: PlayerId },
    TurnLimit { turn: u32 },
}

/// 对局结果，`winner` 为空表示平局。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner: Option<PlayerId>,
    pub reason: OutcomeReason,
}

impl GameOutcome {
    pub fn is_draw(&self) -> bool {
        self.winner.is_none()
    }
}

/// 提供给表现层的事件流，规则引擎自身不读取。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    TurnStarted {
        player_id: PlayerId,
        turn: u32,
    },
    CardDrawn {
        player_id: PlayerId,
        instance_id: InstanceId,
    },
    CardBurned {
        player_id: PlayerId,
        instance_id: InstanceId,
    },
    FatigueDamage {
        player_id: PlayerId,
        amount: i32,
    },
    CardPlayed {
        player_id: PlayerId,
        instance_id: InstanceId,
        template_id: TemplateId,
        #[serde(skip_serializing_if = "Option::is_none")]
        slot: Option<usize>,
    },
    SpellCast {
        player_id: PlayerId,
        instance_id: InstanceId,
    },
    CreatureSummoned {
        player_id: PlayerId,
        instance_id: InstanceId,
        slot: usize,
    },
    CreatureStolen {
        from: PlayerId,
        to: PlayerId,
        instance_id: InstanceId,
    },
    AttackDeclared {
        player_id: PlayerId,
        attacker_id: InstanceId,
        target: AttackTarget,
    },
    DamageApplied {
        target: TargetRef,
        amount: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<InstanceId>,
    },
    HealApplied {
        target: TargetRef,
        amount: i32,
    },
    CreatureDied {
        player_id: PlayerId,
        instance_id: InstanceId,
        template_id: TemplateId,
    },
    ChoiceRequested {
        token: ChoiceToken,
        player_id: PlayerId,
        kind: ChoiceKind,
    },
    ChoiceResolved {
        token: ChoiceToken,
        option: usize,
    },
    TurnEnded {
        player_id: PlayerId,
    },
    GameOver {
        outcome: GameOutcome,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    DuplicateInstance { instance_id: InstanceId },
    ManaOutOfRange { player_id: PlayerId, current: u8, max: u8 },
    HealthOutOfRange { player_id: PlayerId, value: i32 },
    FieldSizeMismatch { player_id: PlayerId, size: usize },
    HandOverflow { player_id: PlayerId, size: usize },
}

/// 一局游戏的全部状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub config: GameConfig,
    pub catalog: Arc<CardCatalog>,
    pub players: [Player; 2],
    pub active_player: PlayerId,
    pub turn: u32,
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_attacks: Vec<PendingAttack>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delayed_effects: Vec<DelayedEffect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub turn_start_hooks: Vec<TurnStartHook>,
    #[serde(default)]
    pub triggers: TriggerRegistry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_choice: Option<PendingChoice>,
    #[serde(default)]
    pub spells_cast_this_game: u32,
    #[serde(default)]
    next_instance_id: InstanceId,
    #[serde(default)]
    next_choice_token: ChoiceToken,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl GameState {
    /// 建立新对局，卡组按给定顺序摸取（第一张最先被摸到）。
    pub fn new(
        config: GameConfig,
        catalog: Arc<CardCatalog>,
        decks: [Vec<Arc<CardTemplate>>; 2],
    ) -> Self {
        let players = [
            Player::new(PLAYER_ONE, &config),
            Player::new(PLAYER_TWO, &config),
        ];
        let mut state = Self {
            config,
            catalog,
            players,
            active_player: PLAYER_ONE,
            turn: 1,
            phase: GamePhase::TurnStart,
            pending_attacks: Vec::new(),
            delayed_effects: Vec::new(),
            turn_start_hooks: Vec::new(),
            triggers: TriggerRegistry::default(),
            pending_choice: None,
            spells_cast_this_game: 0,
            next_instance_id: 1,
            next_choice_token: 1,
            event_log: Vec::new(),
            outcome: None,
        };
        for (player_id, deck) in [PLAYER_ONE, PLAYER_TWO].into_iter().zip(decks) {
            for template in deck.into_iter().rev() {
                let card = state.instantiate(template, player_id);
                state.player_mut(player_id).deck.push(card);
            }
        }
        state
    }

    pub fn instantiate(&mut self, template: Arc<CardTemplate>, owner: PlayerId) -> CardInstance {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        CardInstance::instantiate(id, template, owner)
    }

    pub fn copy_instance(&mut self, source: &CardInstance, owner: PlayerId) -> CardInstance {
        let id = self.next_instance_id;
        self.next_instance_id += 1;
        source.copy(id, owner)
    }

    pub fn issue_choice_token(&mut self) -> ChoiceToken {
        let token = self.next_choice_token;
        self.next_choice_token += 1;
        token
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id as usize)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id as usize)
    }

    /// 调用方保证 `id` 为 0 或 1。
    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id as usize]
    }

    pub fn player_mut(&mut self, id: PlayerId) -> &mut Player {
        &mut self.players[id as usize]
    }

    pub fn active(&self) -> &Player {
        self.player(self.active_player)
    }

    pub fn opponent_of(&self, id: PlayerId) -> PlayerId {
        opponent(id)
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn record_events(&mut self, events: &[GameEvent]) {
        self.event_log.extend_from_slice(events);
    }

    pub fn locate(&self, id: InstanceId) -> Option<(PlayerId, usize)> {
        self.players.iter().find_map(|player| {
            player.field.position(id).map(|slot| (player.id, slot))
        })
    }

    pub fn creature(&self, id: InstanceId) -> Option<&CardInstance> {
        self.players.iter().find_map(|player| player.field.find(id))
    }

    pub fn creature_mut(&mut self, id: InstanceId) -> Option<&mut CardInstance> {
        self.players
            .iter_mut()
            .find_map(|player| player.field.find_mut(id))
    }

    pub fn target_exists(&self, target: &TargetRef) -> bool {
        match target {
            TargetRef::Creature { id } => self.creature(*id).is_some(),
            TargetRef::Hero { player } => self.get_player(*player).is_some(),
        }
    }

    pub fn shuffle_deck<R: Rng + ?Sized>(&mut self, player_id: PlayerId, rng: &mut R) {
        self.player_mut(player_id).shuffle_deck(rng);
    }

    /// 摸牌：牌库为空造成 1 点疲劳伤害，手牌已满则爆牌进坟场。
    pub fn draw_cards(&mut self, player_id: PlayerId, count: u32) -> Vec<GameEvent> {
        let mut events = Vec::new();
        for _ in 0..count {
            if self.is_finished() {
                break;
            }
            let max_hand = self.config.max_hand_size;
            let player = self.player_mut(player_id);
            match player.deck.pop() {
                None => {
                    debug!(player = player_id, "fatigue");
                    events.push(GameEvent::FatigueDamage {
                        player_id,
                        amount: 1,
                    });
                    events.extend(self.damage_hero(player_id, 1, None));
                }
                Some(card) if player.hand.len() >= max_hand => {
                    let instance_id = card.id;
                    player.graveyard.push(card);
                    debug!(player = player_id, instance = instance_id, "card burned");
                    events.push(GameEvent::CardBurned {
                        player_id,
                        instance_id,
                    });
                }
                Some(card) => {
                    let instance_id = card.id;
                    player.hand.push(card);
                    events.push(GameEvent::CardDrawn {
                        player_id,
                        instance_id,
                    });
                }
            }
        }
        events
    }

    /// 生成的卡牌加入手牌，手牌已满时直接进坟场。
    pub fn add_to_hand(&mut self, player_id: PlayerId, card: CardInstance) -> GameEvent {
        let max_hand = self.config.max_hand_size;
        let player = self.player_mut(player_id);
        let instance_id = card.id;
        if player.hand.len() >= max_hand {
            player.graveyard.push(card);
            GameEvent::CardBurned {
                player_id,
                instance_id,
            }
        } else {
            player.hand.push(card);
            GameEvent::CardDrawn {
                player_id,
                instance_id,
            }
        }
    }

    pub fn damage_hero(
        &mut self,
        target_player: PlayerId,
        amount: i32,
        source: Option<InstanceId>,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if amount <= 0 {
            return events;
        }
        let player = self.player_mut(target_player);
        player.health = player.health.saturating_sub(amount).max(0);
        let defeated = player.health == 0;
        events.push(GameEvent::DamageApplied {
            target: TargetRef::Hero {
                player: target_player,
            },
            amount,
            source,
        });
        if defeated && !self.is_finished() {
            events.push(self.declare_outcome(GameOutcome {
                winner: Some(opponent(target_player)),
                reason: OutcomeReason::HeroDefeated {
                    loser: target_player,
                },
            }));
        }
        events
    }

    pub fn heal_hero(&mut self, player_id: PlayerId, amount: i32) -> Option<GameEvent> {
        if amount <= 0 {
            return None;
        }
        let cap = self.config.max_health;
        let player = self.player_mut(player_id);
        let before = player.health;
        player.health = player.health.saturating_add(amount).min(cap).max(before);
        Some(GameEvent::HealApplied {
            target: TargetRef::Hero { player: player_id },
            amount: player.health - before,
        })
    }

    pub fn declare_outcome(&mut self, outcome: GameOutcome) -> GameEvent {
        info!(winner = ?outcome.winner, reason = ?outcome.reason, "game over");
        self.phase = GamePhase::GameOver;
        self.pending_attacks.clear();
        self.outcome = Some(outcome.clone());
        GameEvent::GameOver { outcome }
    }

    /// 生物进场：关键字生效并登记其触发效果。
    pub fn summon(
        &mut self,
        player_id: PlayerId,
        mut card: CardInstance,
        slot: Option<usize>,
    ) -> Result<GameEvent, CardInstance> {
        let field = &self.player(player_id).field;
        let Some(slot) = slot.or_else(|| field.first_free()) else {
            return Err(card);
        };
        card.owner = player_id;
        card.enter_field();
        let registered = card.clone();
        self.player_mut(player_id).field.place(slot, card)?;
        self.triggers.register(&registered);
        Ok(GameEvent::CreatureSummoned {
            player_id,
            instance_id: registered.id,
            slot,
        })
    }

    /// 从战场取下实例并清除所有指向它的攻击宣言与选择锁定。
    pub fn take_from_field(&mut self, id: InstanceId) -> Option<CardInstance> {
        let (owner, slot) = self.locate(id)?;
        let card = self.player_mut(owner).field.take(slot)?;
        self.pending_attacks
            .retain(|attack| !attack.references(id));
        if let Some(choice) = self.pending_choice.as_mut() {
            choice.release_target(id);
        }
        Some(card)
    }

    /// 离场进入坟场，同时注销触发效果与回合开始回调。
    pub fn remove_from_field(&mut self, id: InstanceId) -> Option<GameEvent> {
        let card = self.take_from_field(id)?;
        self.triggers.remove_source(id);
        self.turn_start_hooks.retain(|hook| hook.instance() != id);
        let event = GameEvent::CreatureDied {
            player_id: card.owner,
            instance_id: card.id,
            template_id: card.template_id(),
        };
        debug!(instance = card.id, name = card.name(), "creature left the field");
        self.player_mut(card.owner).graveyard.push(card);
        Some(event)
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let mut seen = HashSet::new();
        for player in &self.players {
            if player.current_mana > player.max_mana || player.max_mana > self.config.max_mana {
                return Err(IntegrityError::ManaOutOfRange {
                    player_id: player.id,
                    current: player.current_mana,
                    max: player.max_mana,
                });
            }
            if player.health < 0 || player.health > self.config.max_health {
                return Err(IntegrityError::HealthOutOfRange {
                    player_id: player.id,
                    value: player.health,
                });
            }
            if player.field.size() != self.config.max_field_size {
                return Err(IntegrityError::FieldSizeMismatch {
                    player_id: player.id,
                    size: player.field.size(),
                });
            }
            if player.hand.len() > self.config.max_hand_size {
                return Err(IntegrityError::HandOverflow {
                    player_id: player.id,
                    size: player.hand.len(),
                });
            }
            for card in player.all_instances() {
                if !seen.insert(card.id) {
                    return Err(IntegrityError::DuplicateInstance {
                        instance_id: card.id,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn pending_choice_kind(&self) -> Option<&ChoiceKind> {
        self.pending_choice.as_ref().map(|choice| &choice.kind)
    }

    pub fn has_pending_attack(&self, attacker: InstanceId) -> bool {
        self.pending_attacks
            .iter()
            .any(|attack| attack.attacker == attacker)
    }

    pub fn pending_attack_target(&self, attacker: InstanceId) -> Option<AttackTarget> {
        self.pending_attacks
            .iter()
            .find(|attack| attack.attacker == attacker)
            .map(|attack| attack.target)
    }
}
