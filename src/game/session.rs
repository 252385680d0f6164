//! 对局会话：持有状态、规则引擎与双方卡组，是表现层的唯一入口。

use std::sync::Arc;

use tracing::info;

use super::card::{InstanceId, TemplateId};
use super::catalog::{sample_decks, standard_catalog, CardCatalog};
use super::choice::PendingChoice;
use super::combat::{self, AttackTarget};
use super::rules::{AttackAction, ChoiceAction, GameAction, PlayCardAction, RuleEngine, RuleError};
use super::state::{GameEvent, GameOutcome, GamePhase, GameState, Player, PlayerId};
use crate::collection::{Collection, CollectionError};
use crate::config::{ConfigError, GameConfig};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error("deck {player_id} references unknown card {id}")]
    UnknownCard { player_id: PlayerId, id: TemplateId },
}

pub struct GameSession {
    state: GameState,
    engine: RuleEngine,
    decks: [Vec<TemplateId>; 2],
}

impl GameSession {
    /// 用给定卡组开局，卡组中的卡牌必须都在目录里。
    pub fn new(
        config: GameConfig,
        catalog: Arc<CardCatalog>,
        decks: [Vec<TemplateId>; 2],
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let state = Self::fresh_state(&config, &catalog, &decks)?;
        let mut session = Self {
            engine: RuleEngine::from_seed(config.seed),
            state,
            decks,
        };
        session.engine.start_match(&mut session.state);
        Ok(session)
    }

    /// 标准目录加两套示例卡组。
    pub fn standard(config: GameConfig) -> Result<Self, SessionError> {
        Self::new(config, standard_catalog(), sample_decks())
    }

    pub fn from_collection(
        config: GameConfig,
        catalog: Arc<CardCatalog>,
        collection: &Collection,
        deck_names: [&str; 2],
    ) -> Result<Self, SessionError> {
        let mut decks: [Vec<TemplateId>; 2] = Default::default();
        for (deck, name) in decks.iter_mut().zip(deck_names) {
            *deck = collection
                .resolve_deck(name, &catalog)?
                .iter()
                .map(|template| template.id)
                .collect();
        }
        Self::new(config, catalog, decks)
    }

    fn fresh_state(
        config: &GameConfig,
        catalog: &Arc<CardCatalog>,
        decks: &[Vec<TemplateId>; 2],
    ) -> Result<GameState, SessionError> {
        let mut resolved: [Vec<_>; 2] = Default::default();
        for (player_id, (slot, ids)) in resolved.iter_mut().zip(decks).enumerate() {
            *slot = catalog.resolve(ids).ok_or_else(|| SessionError::UnknownCard {
                player_id: player_id as PlayerId,
                id: ids
                    .iter()
                    .copied()
                    .find(|id| !catalog.contains(*id))
                    .unwrap_or_default(),
            })?;
        }
        Ok(GameState::new(config.clone(), Arc::clone(catalog), resolved))
    }

    /// 重新开局：双方状态、所有队列与计数器全部重置。
    pub fn restart(&mut self) -> Vec<GameEvent> {
        let config = self.state.config.clone();
        let catalog = Arc::clone(&self.state.catalog);
        let decks: [Vec<_>; 2] = [
            catalog.resolve(&self.decks[0]).unwrap_or_default(),
            catalog.resolve(&self.decks[1]).unwrap_or_default(),
        ];
        info!("session restarted");
        self.state = GameState::new(config.clone(), catalog, decks);
        self.engine = RuleEngine::from_seed(config.seed);
        self.engine.start_match(&mut self.state)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.state.get_player(player_id)
    }

    pub fn active_player(&self) -> PlayerId {
        self.state.active_player
    }

    pub fn turn(&self) -> u32 {
        self.state.turn
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    pub fn outcome(&self) -> Option<&GameOutcome> {
        self.state.outcome.as_ref()
    }

    pub fn pending_choice(&self) -> Option<&PendingChoice> {
        self.state.pending_choice.as_ref()
    }

    pub fn legal_attack_targets(&self, attacker: InstanceId) -> Vec<AttackTarget> {
        combat::legal_attack_targets(&self.state, self.state.active_player, attacker)
    }

    pub fn ready_attackers(&self, player_id: PlayerId) -> Vec<InstanceId> {
        combat::ready_attackers(&self.state, player_id)
    }

    pub fn playable_cards(&self, player_id: PlayerId) -> Vec<InstanceId> {
        self.engine.playable_cards(&self.state, player_id)
    }

    pub fn can_play(&self, action: &PlayCardAction) -> Result<u8, RuleError> {
        self.engine.can_play(&self.state, action)
    }

    pub fn play_card(&mut self, action: PlayCardAction) -> Result<Vec<GameEvent>, RuleError> {
        self.engine.play_card(&mut self.state, action)
    }

    pub fn declare_attack(&mut self, action: AttackAction) -> Result<Vec<GameEvent>, RuleError> {
        self.engine.declare_attack(&mut self.state, action)
    }

    pub fn withdraw_attack(&mut self, player_id: PlayerId, attacker: InstanceId) -> Result<(), RuleError> {
        self.engine.withdraw_attack(&mut self.state, player_id, attacker)
    }

    pub fn attack_now(&mut self, action: AttackAction) -> Result<Vec<GameEvent>, RuleError> {
        self.engine.attack_now(&mut self.state, action)
    }

    pub fn end_turn(&mut self, player_id: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        self.engine.end_turn(&mut self.state, player_id)
    }

    pub fn resolve_choice(&mut self, action: ChoiceAction) -> Result<Vec<GameEvent>, RuleError> {
        self.engine.resolve_choice(&mut self.state, action)
    }

    pub fn apply(&mut self, action: &GameAction) -> Result<Vec<GameEvent>, RuleError> {
        self.engine.apply(&mut self.state, action)
    }

    /// 取出上次调用以来的新事件，并清空状态中的事件日志。
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.state.event_log)
    }
}
