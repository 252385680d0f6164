use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::card::{AttackReadiness, CardType, InstanceId};
use super::choice::ChoiceToken;
use super::combat::{self, AttackTarget, PendingAttack};
use super::effects::{EffectContext, EffectEngine, EffectTiming, TargetRef};
use super::state::{
    opponent, GameEvent, GameOutcome, GamePhase, GameState, IntegrityError, OutcomeReason, PlayerId,
    PLAYER_ONE,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayCardAction {
    pub player_id: PlayerId,
    pub instance_id: InstanceId,
    #[serde(default)]
    pub slot: Option<usize>,
    #[serde(default)]
    pub targets: Vec<TargetRef>,
}

impl PlayCardAction {
    pub fn new(player_id: PlayerId, instance_id: InstanceId) -> Self {
        Self {
            player_id,
            instance_id,
            slot: None,
            targets: Vec::new(),
        }
    }

    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_target(mut self, target: TargetRef) -> Self {
        self.targets.push(target);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackAction {
    pub player_id: PlayerId,
    pub attacker_id: InstanceId,
    pub target: AttackTarget,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChoiceAction {
    pub player_id: PlayerId,
    pub token: ChoiceToken,
    pub option: usize,
}

/// 表现层或 AI 发出的一条指令。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    PlayCard(PlayCardAction),
    DeclareAttack(AttackAction),
    AttackNow(AttackAction),
    ResolveChoice(ChoiceAction),
    EndTurn { player_id: PlayerId },
}

impl GameAction {
    pub fn player_id(&self) -> PlayerId {
        match self {
            GameAction::PlayCard(action) => action.player_id,
            GameAction::DeclareAttack(action) | GameAction::AttackNow(action) => action.player_id,
            GameAction::ResolveChoice(action) => action.player_id,
            GameAction::EndTurn { player_id } => *player_id,
        }
    }
}

/// 违反前置条件的指令，返回错误时状态不变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the game is already over")]
    GameFinished,
    #[error("it is not player {player_id}'s turn")]
    NotPlayerTurn { player_id: PlayerId },
    #[error("unknown player {player_id}")]
    PlayerNotFound { player_id: PlayerId },
    #[error("card {instance_id} is not in hand")]
    CardNotInHand { instance_id: InstanceId },
    #[error("needs {required} mana, {available} available")]
    InsufficientMana { required: u8, available: u8 },
    #[error("no free field slot")]
    FieldFull,
    #[error("field slot {slot} is occupied")]
    SlotOccupied { slot: usize },
    #[error("field slot {slot} does not exist")]
    InvalidSlot { slot: usize },
    #[error("target {target:?} is not in play")]
    InvalidTarget { target: TargetRef },
    #[error("attacker {instance_id} is not on the field")]
    AttackerNotFound { instance_id: InstanceId },
    #[error("attacker {instance_id} is {readiness:?}")]
    AttackerNotReady {
        instance_id: InstanceId,
        readiness: AttackReadiness,
    },
    #[error("card {instance_id} is not a creature")]
    NotACreature { instance_id: InstanceId },
    #[error("cannot attack {target:?}")]
    InvalidAttackTarget { target: AttackTarget },
    #[error("a taunt creature must be attacked first")]
    TauntBlocks,
    #[error("choice {token} must be resolved first")]
    ChoicePending { token: ChoiceToken },
    #[error("no pending choice {token}")]
    ChoiceNotFound { token: ChoiceToken },
    #[error("option {option} is out of range")]
    InvalidChoice { option: usize },
    #[error("state invariant broken: {error:?}")]
    IntegrityViolation { error: IntegrityError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome.clone();
        Self {
            state,
            events,
            outcome,
        }
    }
}

#[derive(Default)]
pub struct RuleEngine {
    effect_engine: EffectEngine,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            effect_engine: EffectEngine::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            effect_engine: EffectEngine::with_seed(seed),
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map(Self::with_seed).unwrap_or_default()
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn ensure_turn_owner(state: &GameState, player_id: PlayerId) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if state.get_player(player_id).is_none() {
            return Err(RuleError::PlayerNotFound { player_id });
        }
        if let Some(choice) = &state.pending_choice {
            return Err(RuleError::ChoicePending {
                token: choice.token,
            });
        }
        if state.active_player != player_id || state.phase != GamePhase::Main {
            return Err(RuleError::NotPlayerTurn { player_id });
        }
        Ok(())
    }

    fn commit(state: &mut GameState, events: Vec<GameEvent>) -> Vec<GameEvent> {
        state.record_events(&events);
        debug_assert!(state.integrity_check().is_ok(), "{:?}", state.integrity_check());
        events
    }

    pub fn apply(&mut self, state: &mut GameState, action: &GameAction) -> Result<Vec<GameEvent>, RuleError> {
        match action {
            GameAction::PlayCard(play) => self.play_card(state, play.clone()),
            GameAction::DeclareAttack(attack) => self.declare_attack(state, *attack),
            GameAction::AttackNow(attack) => self.attack_now(state, *attack),
            GameAction::ResolveChoice(choice) => self.resolve_choice(state, *choice),
            GameAction::EndTurn { player_id } => self.end_turn(state, *player_id),
        }
    }

    /// 洗牌、发起始手牌并开始先手玩家的第一个回合。
    pub fn start_match(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let hand_size = state.config.starting_hand_size;
        for player_id in [PLAYER_ONE, opponent(PLAYER_ONE)] {
            state.shuffle_deck(player_id, self.effect_engine.rng_mut());
            events.extend(state.draw_cards(player_id, hand_size));
        }
        state.active_player = PLAYER_ONE;
        state.turn = 1;
        info!(hand_size, "match started");
        events.extend(self.begin_turn(state));
        Self::commit(state, events)
    }

    /// 检查出牌的前置条件（法力、区域、位置与目标），返回实际费用。
    pub fn can_play(&self, state: &GameState, action: &PlayCardAction) -> Result<u8, RuleError> {
        Self::ensure_turn_owner(state, action.player_id)?;
        let player = state.player(action.player_id);
        let card = player
            .find_in_hand(action.instance_id)
            .ok_or(RuleError::CardNotInHand {
                instance_id: action.instance_id,
            })?;
        let cost = card.template.effective_cost(state.spells_cast_this_game);
        if player.current_mana < cost {
            return Err(RuleError::InsufficientMana {
                required: cost,
                available: player.current_mana,
            });
        }
        if card.is_creature() {
            match action.slot {
                Some(slot) if slot >= player.field.size() => {
                    return Err(RuleError::InvalidSlot { slot });
                }
                Some(slot) if !player.field.is_free(slot) => {
                    return Err(RuleError::SlotOccupied { slot });
                }
                Some(_) => {}
                None if player.field.is_full() => return Err(RuleError::FieldFull),
                None => {}
            }
        }
        if let Some(target) = action.targets.iter().find(|target| !state.target_exists(target)) {
            return Err(RuleError::InvalidTarget { target: *target });
        }
        Ok(cost)
    }

    pub fn effective_cost(state: &GameState, player_id: PlayerId, instance_id: InstanceId) -> Option<u8> {
        state
            .get_player(player_id)?
            .find_in_hand(instance_id)
            .map(|card| card.template.effective_cost(state.spells_cast_this_game))
    }

    /// 当前可以打出的手牌（只检查法力与场地）。
    pub fn playable_cards(&self, state: &GameState, player_id: PlayerId) -> Vec<InstanceId> {
        let Some(player) = state.get_player(player_id) else {
            return Vec::new();
        };
        player
            .hand
            .iter()
            .map(|card| PlayCardAction::new(player_id, card.id))
            .filter(|action| self.can_play(state, action).is_ok())
            .map(|action| action.instance_id)
            .collect()
    }

    pub fn play_card(
        &mut self,
        state: &mut GameState,
        action: PlayCardAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        let cost = self.can_play(state, &action)?;
        let player_id = action.player_id;

        let player = state.player_mut(player_id);
        let card = player
            .remove_from_hand(action.instance_id)
            .ok_or(RuleError::CardNotInHand {
                instance_id: action.instance_id,
            })?;
        player.spend_mana(cost);
        debug!(player = player_id, card = card.name(), cost, "card played");

        let template = card.template.clone();
        let instance_id = card.id;
        let mut events = Vec::new();
        let mut slot = None;
        if template.is_creature() {
            match state.summon(player_id, card, action.slot) {
                Ok(event) => {
                    if let GameEvent::CreatureSummoned { slot: placed, .. } = event {
                        slot = Some(placed);
                    }
                    events.push(event);
                }
                Err(card) => {
                    // can_play 已保证有空位
                    state.player_mut(player_id).graveyard.push(card);
                }
            }
        } else {
            state.player_mut(player_id).graveyard.push(card);
        }

        let context = EffectContext::new(player_id)
            .with_source(instance_id)
            .with_targets(action.targets);
        let effects = template.immediate_effects().cloned().collect();
        events.extend(self.effect_engine.apply_sequence(state, effects, context));

        events.push(GameEvent::CardPlayed {
            player_id,
            instance_id,
            template_id: template.id,
            slot,
        });
        if template.card_type == CardType::Spell {
            state.spells_cast_this_game += 1;
            events.push(GameEvent::SpellCast {
                player_id,
                instance_id,
            });
            if !state.is_finished() {
                events.extend(self.effect_engine.fire(state, EffectTiming::WhenSpellCast, player_id));
            }
        }
        Ok(Self::commit(state, events))
    }

    /// 记录攻击宣言；同一攻击者再次宣言会替换之前的目标。
    pub fn declare_attack(
        &mut self,
        state: &mut GameState,
        action: AttackAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        Self::ensure_turn_owner(state, action.player_id)?;
        combat::validate_attack(state, action.player_id, action.attacker_id, action.target)?;

        state
            .pending_attacks
            .retain(|attack| attack.attacker != action.attacker_id);
        state.pending_attacks.push(PendingAttack {
            player_id: action.player_id,
            attacker: action.attacker_id,
            target: action.target,
        });
        debug!(attacker = action.attacker_id, target = ?action.target, "attack declared");
        let events = vec![GameEvent::AttackDeclared {
            player_id: action.player_id,
            attacker_id: action.attacker_id,
            target: action.target,
        }];
        Ok(Self::commit(state, events))
    }

    pub fn withdraw_attack(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
        attacker_id: InstanceId,
    ) -> Result<(), RuleError> {
        Self::ensure_turn_owner(state, player_id)?;
        let before = state.pending_attacks.len();
        state
            .pending_attacks
            .retain(|attack| attack.attacker != attacker_id);
        if state.pending_attacks.len() == before {
            return Err(RuleError::AttackerNotFound {
                instance_id: attacker_id,
            });
        }
        Ok(())
    }

    /// 立即结算一次攻击，并撤销该攻击者尚未结算的宣言。
    pub fn attack_now(
        &mut self,
        state: &mut GameState,
        action: AttackAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        Self::ensure_turn_owner(state, action.player_id)?;
        combat::validate_attack(state, action.player_id, action.attacker_id, action.target)?;

        state
            .pending_attacks
            .retain(|attack| attack.attacker != action.attacker_id);
        let events = combat::execute_attack(
            &mut self.effect_engine,
            state,
            action.attacker_id,
            action.target,
        );
        Ok(Self::commit(state, events))
    }

    pub fn resolve_choice(
        &mut self,
        state: &mut GameState,
        action: ChoiceAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        let choice = state
            .pending_choice
            .as_ref()
            .filter(|choice| choice.token == action.token)
            .ok_or(RuleError::ChoiceNotFound {
                token: action.token,
            })?;
        if choice.owner != action.player_id {
            return Err(RuleError::NotPlayerTurn {
                player_id: action.player_id,
            });
        }
        if !choice.is_valid_option(action.option) {
            return Err(RuleError::InvalidChoice {
                option: action.option,
            });
        }
        let Some(choice) = state.pending_choice.take() else {
            return Err(RuleError::ChoiceNotFound {
                token: action.token,
            });
        };
        let events = self
            .effect_engine
            .complete_choice(state, choice, action.option);
        Ok(Self::commit(state, events))
    }

    /// 结束回合：按宣言顺序结算攻击，交换行动玩家并检查回合上限。
    pub fn end_turn(&mut self, state: &mut GameState, player_id: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        Self::ensure_turn_owner(state, player_id)?;
        state.phase = GamePhase::TurnEnd;

        let mut events = self.resolve_pending_attacks(state, player_id);
        if state.is_finished() {
            return Ok(Self::commit(state, events));
        }

        events.extend(self.effect_engine.fire(state, EffectTiming::EndOfTurn, player_id));
        if state.is_finished() {
            return Ok(Self::commit(state, events));
        }
        events.push(GameEvent::TurnEnded { player_id });

        let next = opponent(player_id);
        if next == PLAYER_ONE {
            state.turn += 1;
        }
        state.active_player = next;
        if state.turn > state.config.max_turns {
            events.push(state.declare_outcome(GameOutcome {
                winner: None,
                reason: OutcomeReason::TurnLimit { turn: state.turn },
            }));
            return Ok(Self::commit(state, events));
        }

        events.extend(self.begin_turn(state));
        Ok(Self::commit(state, events))
    }

    fn resolve_pending_attacks(&mut self, state: &mut GameState, player_id: PlayerId) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let attacks = std::mem::take(&mut state.pending_attacks);
        for attack in attacks {
            if state.is_finished() {
                break;
            }
            if let Err(error) = combat::validate_attack(state, player_id, attack.attacker, attack.target) {
                debug!(attacker = attack.attacker, %error, "declared attack dropped");
                continue;
            }
            events.extend(combat::execute_attack(
                &mut self.effect_engine,
                state,
                attack.attacker,
                attack.target,
            ));
        }
        events
    }

    fn begin_turn(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        let player_id = state.active_player;
        state.phase = GamePhase::TurnStart;
        info!(turn = state.turn, player = player_id, "turn started");

        let mut events = vec![GameEvent::TurnStarted {
            player_id,
            turn: state.turn,
        }];
        let mana_cap = state.config.max_mana;
        state.player_mut(player_id).refill_mana(mana_cap);
        events.extend(state.draw_cards(player_id, 1));
        if state.is_finished() {
            return events;
        }

        state.player_mut(player_id).ready_field();
        self.effect_engine.run_turn_start_hooks(state, player_id);
        events.extend(self.effect_engine.fire(state, EffectTiming::StartOfTurn, player_id));
        events.extend(self.effect_engine.run_delayed(state));

        if !state.is_finished() {
            state.phase = GamePhase::Main;
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::card::{CardTemplate, TemplateId};
    use crate::game::catalog::{standard_catalog, CardCatalog};
    use crate::game::choice::{AdaptOption, ChoiceKind};
    use crate::game::state::PLAYER_TWO;
    use std::sync::Arc;

    const SQUIRE: TemplateId = 900;
    const DUELIST: TemplateId = 901;
    const OGRE: TemplateId = 902;

    fn catalog() -> Arc<CardCatalog> {
        let mut catalog = (*standard_catalog()).clone();
        catalog.insert(CardTemplate::creature(SQUIRE, "Squire", 3, 2, 2));
        catalog.insert(CardTemplate::creature(DUELIST, "Duelist", 2, 3, 2));
        catalog.insert(CardTemplate::creature(OGRE, "Ogre", 5, 5, 4));
        Arc::new(catalog)
    }

    fn filler_deck(catalog: &CardCatalog, size: usize) -> Vec<Arc<CardTemplate>> {
        let template = catalog.get(1).expect("standard card");
        vec![template; size]
    }

    /// 双方各有 20 张牌、起始手牌为空，已进入先手玩家的主阶段。
    fn setup_with(config: GameConfig, deck_size: usize) -> (RuleEngine, GameState) {
        let catalog = catalog();
        let decks = [filler_deck(&catalog, deck_size), filler_deck(&catalog, deck_size)];
        let mut state = GameState::new(config, catalog, decks);
        let mut engine = RuleEngine::with_seed(42);
        engine.start_match(&mut state);
        (engine, state)
    }

    fn setup() -> (RuleEngine, GameState) {
        let config = GameConfig {
            starting_hand_size: 0,
            ..GameConfig::default()
        };
        setup_with(config, 20)
    }

    fn give(state: &mut GameState, player: PlayerId, template: TemplateId) -> InstanceId {
        let template = state.catalog.get(template).expect("known card");
        let card = state.instantiate(template, player);
        let id = card.id;
        state.player_mut(player).hand.push(card);
        id
    }

    fn set_mana(state: &mut GameState, player: PlayerId, mana: u8) {
        let player = state.player_mut(player);
        player.max_mana = mana;
        player.current_mana = mana;
    }

    fn field_ready(state: &mut GameState, player: PlayerId, template: TemplateId) -> InstanceId {
        let template = state.catalog.get(template).expect("known card");
        let card = state.instantiate(template, player);
        let id = card.id;
        state.summon(player, card, None).expect("free slot");
        if let Some(card) = state.creature_mut(id) {
            card.can_attack_this_turn = true;
        }
        id
    }

    fn attack(player_id: PlayerId, attacker_id: InstanceId, target: AttackTarget) -> AttackAction {
        AttackAction {
            player_id,
            attacker_id,
            target,
        }
    }

    #[test]
    fn match_start_draws_hands_and_opens_first_turn() {
        let (_, state) = setup_with(GameConfig::default(), 20);
        assert_eq!(state.phase, GamePhase::Main);
        assert_eq!(state.active_player, PLAYER_ONE);
        assert_eq!(state.player(PLAYER_ONE).hand.len(), 5);
        assert_eq!(state.player(PLAYER_TWO).hand.len(), 4);
        assert_eq!(state.player(PLAYER_ONE).max_mana, 1);
        assert_eq!(state.player(PLAYER_ONE).current_mana, 1);
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn playing_creature_spends_mana_and_fills_slot() {
        let (mut engine, mut state) = setup();
        set_mana(&mut state, PLAYER_ONE, 3);
        let squire = give(&mut state, PLAYER_ONE, SQUIRE);
        let events = engine
            .play_card(&mut state, PlayCardAction::new(PLAYER_ONE, squire).with_slot(0))
            .expect("legal play");
        let player = state.player(PLAYER_ONE);
        assert_eq!(player.current_mana, 0);
        let placed = player.field.get(0).expect("slot 0 filled");
        assert_eq!(placed.id, squire);
        assert_eq!((placed.current_attack, placed.current_health), (2, 2));
        assert!(player.find_in_hand(squire).is_none());
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::CardPlayed { instance_id, .. } if *instance_id == squire)));
    }

    #[test]
    fn failed_plays_leave_state_untouched() {
        let (mut engine, mut state) = setup();
        set_mana(&mut state, PLAYER_ONE, 2);
        let squire = give(&mut state, PLAYER_ONE, SQUIRE);
        let duelist = give(&mut state, PLAYER_ONE, DUELIST);
        field_ready(&mut state, PLAYER_ONE, DUELIST);
        let enemy_card = give(&mut state, PLAYER_TWO, DUELIST);
        let before = state.clone();

        let attempts = [
            (
                PlayCardAction::new(PLAYER_ONE, squire),
                RuleError::InsufficientMana {
                    required: 3,
                    available: 2,
                },
            ),
            (
                PlayCardAction::new(PLAYER_ONE, duelist).with_slot(0),
                RuleError::SlotOccupied { slot: 0 },
            ),
            (
                PlayCardAction::new(PLAYER_ONE, duelist).with_slot(9),
                RuleError::InvalidSlot { slot: 9 },
            ),
            (
                PlayCardAction::new(PLAYER_TWO, enemy_card),
                RuleError::NotPlayerTurn {
                    player_id: PLAYER_TWO,
                },
            ),
            (
                PlayCardAction::new(PLAYER_ONE, enemy_card),
                RuleError::CardNotInHand {
                    instance_id: enemy_card,
                },
            ),
            (
                PlayCardAction::new(PLAYER_ONE, duelist).with_target(TargetRef::Creature { id: 999 }),
                RuleError::InvalidTarget {
                    target: TargetRef::Creature { id: 999 },
                },
            ),
        ];
        for (action, expected) in attempts {
            assert_eq!(engine.play_card(&mut state, action), Err(expected));
            assert_eq!(state, before);
        }
    }

    #[test]
    fn full_field_rejects_creature() {
        let (mut engine, mut state) = setup();
        for _ in 0..state.config.max_field_size {
            field_ready(&mut state, PLAYER_ONE, DUELIST);
        }
        set_mana(&mut state, PLAYER_ONE, 5);
        let duelist = give(&mut state, PLAYER_ONE, DUELIST);
        assert_eq!(
            engine.play_card(&mut state, PlayCardAction::new(PLAYER_ONE, duelist)),
            Err(RuleError::FieldFull)
        );
    }

    #[test]
    fn spell_goes_to_graveyard_and_counts_for_cost_reduction() {
        let (mut engine, mut state) = setup();
        set_mana(&mut state, PLAYER_ONE, 10);
        let giant = give(&mut state, PLAYER_ONE, 12);
        let wyrm = field_ready(&mut state, PLAYER_ONE, 15);
        let innervate = give(&mut state, PLAYER_ONE, 26);
        assert_eq!(RuleEngine::effective_cost(&state, PLAYER_ONE, giant), Some(12));

        let events = engine
            .play_card(&mut state, PlayCardAction::new(PLAYER_ONE, innervate))
            .expect("free spell");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::SpellCast { .. })));
        assert_eq!(state.spells_cast_this_game, 1);
        assert_eq!(state.player(PLAYER_ONE).graveyard.last().map(|c| c.id), Some(innervate));
        assert_eq!(state.creature(wyrm).map(|c| c.current_attack), Some(2));
        assert_eq!(RuleEngine::effective_cost(&state, PLAYER_ONE, giant), Some(11));
    }

    #[test]
    fn direct_attack_hits_hero() {
        let (mut engine, mut state) = setup();
        let yeti = field_ready(&mut state, PLAYER_ONE, 5);
        engine
            .attack_now(&mut state, attack(PLAYER_ONE, yeti, AttackTarget::Hero))
            .expect("legal attack");
        assert_eq!(state.player(PLAYER_TWO).health, 26);
        assert_eq!(state.creature(yeti).map(|c| c.has_attacked_this_turn), Some(true));
        assert!(matches!(
            engine.attack_now(&mut state, attack(PLAYER_ONE, yeti, AttackTarget::Hero)),
            Err(RuleError::AttackerNotReady { .. })
        ));
    }

    #[test]
    fn taunt_rejects_declaration_on_other_targets() {
        let (mut engine, mut state) = setup();
        let yeti = field_ready(&mut state, PLAYER_ONE, 5);
        let plain = field_ready(&mut state, PLAYER_TWO, DUELIST);
        field_ready(&mut state, PLAYER_TWO, 3);
        let before = state.clone();
        assert_eq!(
            engine.declare_attack(&mut state, attack(PLAYER_ONE, yeti, AttackTarget::Hero)),
            Err(RuleError::TauntBlocks)
        );
        assert_eq!(
            engine.declare_attack(
                &mut state,
                attack(PLAYER_ONE, yeti, AttackTarget::Creature { id: plain })
            ),
            Err(RuleError::TauntBlocks)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn declared_batch_matches_instant_attacks() {
        let (_, base) = setup();
        let mut base = base;
        let a = field_ready(&mut base, PLAYER_ONE, DUELIST);
        let b = field_ready(&mut base, PLAYER_ONE, 29);
        let ogre = field_ready(&mut base, PLAYER_TWO, OGRE);
        let pairs = [
            (a, AttackTarget::Creature { id: ogre }),
            (b, AttackTarget::Creature { id: ogre }),
        ];

        let mut instant_state = base.clone();
        let mut instant = RuleEngine::with_seed(7);
        for (attacker, target) in pairs {
            instant
                .attack_now(&mut instant_state, attack(PLAYER_ONE, attacker, target))
                .expect("legal attack");
        }
        instant.end_turn(&mut instant_state, PLAYER_ONE).expect("end turn");

        let mut batch_state = base.clone();
        let mut batch = RuleEngine::with_seed(7);
        for (attacker, target) in pairs {
            batch
                .declare_attack(&mut batch_state, attack(PLAYER_ONE, attacker, target))
                .expect("legal declaration");
        }
        assert_eq!(batch_state.player(PLAYER_TWO).field.count(), 1);
        batch.end_turn(&mut batch_state, PLAYER_ONE).expect("end turn");

        assert_eq!(instant_state.players, batch_state.players);
        assert!(batch_state.creature(ogre).is_none());
        assert!(batch_state.creature(a).is_none());
        assert_eq!(batch_state.creature(b).map(|c| c.current_health), Some(1));
    }

    #[test]
    fn redeclaring_replaces_previous_target() {
        let (mut engine, mut state) = setup();
        let yeti = field_ready(&mut state, PLAYER_ONE, 5);
        let duelist = field_ready(&mut state, PLAYER_TWO, DUELIST);
        engine
            .declare_attack(&mut state, attack(PLAYER_ONE, yeti, AttackTarget::Hero))
            .expect("legal declaration");
        engine
            .declare_attack(
                &mut state,
                attack(PLAYER_ONE, yeti, AttackTarget::Creature { id: duelist }),
            )
            .expect("legal declaration");
        assert_eq!(state.pending_attacks.len(), 1);
        engine.end_turn(&mut state, PLAYER_ONE).expect("end turn");
        assert_eq!(state.player(PLAYER_TWO).health, 30);
        assert!(state.creature(duelist).is_none());
    }

    #[test]
    fn batch_stops_once_a_hero_falls() {
        let (mut engine, mut state) = setup();
        let first = field_ready(&mut state, PLAYER_ONE, 5);
        let second = field_ready(&mut state, PLAYER_ONE, 5);
        state.player_mut(PLAYER_TWO).health = 4;
        for attacker in [first, second] {
            engine
                .declare_attack(&mut state, attack(PLAYER_ONE, attacker, AttackTarget::Hero))
                .expect("legal declaration");
        }
        engine.end_turn(&mut state, PLAYER_ONE).expect("end turn");
        assert_eq!(state.phase, GamePhase::GameOver);
        assert_eq!(state.outcome.as_ref().and_then(|o| o.winner), Some(PLAYER_ONE));
        assert_eq!(state.creature(second).map(|c| c.has_attacked_this_turn), Some(false));
        assert_eq!(state.active_player, PLAYER_ONE);
        assert_eq!(
            engine.end_turn(&mut state, PLAYER_ONE),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn turn_start_refills_mana_and_readies_creatures() {
        let (mut engine, mut state) = setup();
        let enemy = field_ready(&mut state, PLAYER_TWO, DUELIST);
        if let Some(card) = state.creature_mut(enemy) {
            card.can_attack_this_turn = false;
            card.has_attacked_this_turn = true;
        }
        let hand_before = state.player(PLAYER_TWO).hand.len();
        engine.end_turn(&mut state, PLAYER_ONE).expect("end turn");
        let player = state.player(PLAYER_TWO);
        assert_eq!(state.active_player, PLAYER_TWO);
        assert_eq!((player.max_mana, player.current_mana), (1, 1));
        assert_eq!(player.hand.len(), hand_before + 1);
        assert_eq!(
            state.creature(enemy).map(|c| c.readiness()),
            Some(AttackReadiness::Ready)
        );
        assert_eq!(state.turn, 1);
        engine.end_turn(&mut state, PLAYER_TWO).expect("end turn");
        assert_eq!(state.turn, 2);
        assert_eq!(state.player(PLAYER_ONE).max_mana, 2);
    }

    #[test]
    fn frostbolt_freezes_until_owner_turn_start() {
        let (mut engine, mut state) = setup();
        set_mana(&mut state, PLAYER_ONE, 2);
        let target = field_ready(&mut state, PLAYER_TWO, OGRE);
        let bolt = give(&mut state, PLAYER_ONE, 8);
        engine
            .play_card(
                &mut state,
                PlayCardAction::new(PLAYER_ONE, bolt).with_target(TargetRef::Creature { id: target }),
            )
            .expect("legal play");
        let card = state.creature(target).expect("survives");
        assert!(card.is_frozen);
        assert_eq!(card.current_health, 1);
        engine.end_turn(&mut state, PLAYER_ONE).expect("end turn");
        assert_eq!(state.creature(target).map(|c| c.is_frozen), Some(false));
    }

    #[test]
    fn turn_limit_ends_in_draw() {
        let config = GameConfig {
            starting_hand_size: 0,
            ..GameConfig::default()
        };
        let (mut engine, mut state) = setup_with(config, 60);
        let mut ends = 0;
        while !state.is_finished() {
            let active = state.active_player;
            engine.end_turn(&mut state, active).expect("end turn");
            ends += 1;
        }
        assert_eq!(ends, 100);
        let outcome = state.outcome.clone().expect("finished");
        assert!(outcome.is_draw());
        assert_eq!(outcome.reason, OutcomeReason::TurnLimit { turn: 51 });
        assert_eq!(state.player(PLAYER_ONE).health, 30);
        assert_eq!(state.player(PLAYER_TWO).health, 30);
    }

    #[test]
    fn fatigue_can_end_the_game() {
        let config = GameConfig {
            starting_hand_size: 0,
            ..GameConfig::default()
        };
        let (mut engine, mut state) = setup_with(config, 0);
        state.player_mut(PLAYER_TWO).health = 1;
        engine.end_turn(&mut state, PLAYER_ONE).expect("end turn");
        assert_eq!(state.outcome.as_ref().and_then(|o| o.winner), Some(PLAYER_ONE));
    }

    #[test]
    fn adapt_waits_for_choice_and_blocks_other_commands() {
        let (mut engine, mut state) = setup();
        set_mana(&mut state, PLAYER_ONE, 3);
        let raptor = give(&mut state, PLAYER_ONE, 19);
        let events = engine
            .play_card(&mut state, PlayCardAction::new(PLAYER_ONE, raptor))
            .expect("legal play");
        let token = events
            .iter()
            .find_map(|event| match event {
                GameEvent::ChoiceRequested { token, .. } => Some(*token),
                _ => None,
            })
            .expect("choice requested");
        assert!(matches!(
            state.pending_choice_kind(),
            Some(ChoiceKind::Adapt { target: Some(id), .. }) if *id == raptor
        ));
        assert_eq!(
            engine.end_turn(&mut state, PLAYER_ONE),
            Err(RuleError::ChoicePending { token })
        );
        assert_eq!(
            engine.resolve_choice(
                &mut state,
                ChoiceAction {
                    player_id: PLAYER_ONE,
                    token: token + 1,
                    option: 0
                }
            ),
            Err(RuleError::ChoiceNotFound { token: token + 1 })
        );
        let taunt = AdaptOption::ALL
            .iter()
            .position(|option| *option == AdaptOption::Taunt)
            .expect("taunt option");
        engine
            .resolve_choice(
                &mut state,
                ChoiceAction {
                    player_id: PLAYER_ONE,
                    token,
                    option: taunt,
                },
            )
            .expect("valid choice");
        assert!(state.pending_choice.is_none());
        assert_eq!(state.creature(raptor).map(|c| c.is_taunting), Some(true));
        assert!(engine.end_turn(&mut state, PLAYER_ONE).is_ok());
    }

    #[test]
    fn time_bomb_detonates_on_casters_next_turn() {
        let (mut engine, mut state) = setup();
        set_mana(&mut state, PLAYER_ONE, 2);
        let bomb = give(&mut state, PLAYER_ONE, 23);
        engine
            .play_card(&mut state, PlayCardAction::new(PLAYER_ONE, bomb))
            .expect("legal play");
        engine.end_turn(&mut state, PLAYER_ONE).expect("end turn");
        assert_eq!(state.player(PLAYER_TWO).health, 30);
        engine.end_turn(&mut state, PLAYER_TWO).expect("end turn");
        assert_eq!(state.player(PLAYER_TWO).health, 25);
    }

    #[test]
    fn fireball_can_win_the_game() {
        let (mut engine, mut state) = setup();
        set_mana(&mut state, PLAYER_ONE, 4);
        state.player_mut(PLAYER_TWO).health = 6;
        let fireball = give(&mut state, PLAYER_ONE, 6);
        let events = engine
            .play_card(
                &mut state,
                PlayCardAction::new(PLAYER_ONE, fireball).with_target(TargetRef::Hero { player: PLAYER_TWO }),
            )
            .expect("legal play");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::GameOver { .. })));
        assert_eq!(state.player(PLAYER_TWO).health, 0);
        assert_eq!(state.phase, GamePhase::GameOver);
    }
}
