pub mod ai;
pub mod collection;
pub mod config;
pub mod game;
pub mod logging;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy};
pub use collection::{Collection, CollectionError, DeckRules};
pub use config::{ConfigError, GameConfig};
pub use game::{
    AttackAction, AttackTarget, CardCatalog, CardInstance, CardTemplate, ChoiceAction, EffectDescriptor,
    EffectKind, GameAction, GameEvent, GameOutcome, GamePhase, GameSession, GameState, IntegrityError,
    PlayCardAction, Player, PlayerId, RuleEngine, RuleError, RuleResolution, SessionError, TargetRef,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    logging::init_logging();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn known_player(state: &GameState, player_id: PlayerId) -> Result<(), JsValue> {
    state
        .get_player(player_id)
        .map(|_| ())
        .ok_or_else(|| to_js_error(RuleError::PlayerNotFound { player_id }))
}

fn parse_config(config_json: Option<String>) -> Result<GameConfig, JsValue> {
    match config_json {
        Some(json) => GameConfig::from_json(&json).map_err(serde_to_js_error),
        None => Ok(GameConfig::default()),
    }
}

fn ai_config(difficulty: Option<&str>, strategy: Option<&str>) -> AiConfig {
    let difficulty = difficulty
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or(AiDifficulty::Normal);
    let config = AiConfig::from_difficulty(difficulty);
    match strategy.and_then(|value| AiStrategy::from_str(value).ok()) {
        Some(strategy) => config.with_strategy(strategy),
        None => config,
    }
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

/// 面向前端的对局句柄：所有指令以 JSON 进出，错误以 `RuleError` 对象抛出。
#[wasm_bindgen]
pub struct GameEngine {
    session: GameSession,
}

#[wasm_bindgen]
impl GameEngine {
    /// 使用标准目录与示例卡组开局。
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<GameEngine, JsValue> {
        let config = parse_config(config_json)?;
        let session = GameSession::standard(config).map_err(serde_to_js_error)?;
        Ok(GameEngine { session })
    }

    /// 从收藏中的两个命名卡组开局。
    pub fn from_collection(
        config_json: Option<String>,
        collection_json: &str,
        first_deck: &str,
        second_deck: &str,
    ) -> Result<GameEngine, JsValue> {
        let config = parse_config(config_json)?;
        let collection = Collection::from_json(collection_json).map_err(serde_to_js_error)?;
        let session = GameSession::from_collection(
            config,
            game::standard_catalog(),
            &collection,
            [first_deck, second_deck],
        )
        .map_err(serde_to_js_error)?;
        Ok(GameEngine { session })
    }

    fn resolve(&self, events: Vec<GameEvent>) -> Result<String, JsValue> {
        make_resolution_json(RuleResolution::new(self.session.state().clone(), events))
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.session.state()).map_err(serde_to_js_error)
    }

    pub fn active_player(&self) -> u8 {
        self.session.active_player()
    }

    pub fn turn(&self) -> u32 {
        self.session.turn()
    }

    pub fn is_finished(&self) -> bool {
        self.session.state().is_finished()
    }

    pub fn play_card_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: PlayCardAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = self.session.play_card(action).map_err(to_js_error)?;
        self.resolve(events)
    }

    /// 宣告攻击，回合结束时统一结算。
    pub fn declare_attack_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: AttackAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = self.session.declare_attack(action).map_err(to_js_error)?;
        self.resolve(events)
    }

    pub fn withdraw_attack(&mut self, player_id: u8, attacker_id: u32) -> Result<(), JsValue> {
        self.session
            .withdraw_attack(player_id, attacker_id)
            .map_err(to_js_error)
    }

    /// 立即结算一次攻击。
    pub fn attack_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: AttackAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = self.session.attack_now(action).map_err(to_js_error)?;
        self.resolve(events)
    }

    pub fn resolve_choice_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: ChoiceAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = self.session.resolve_choice(action).map_err(to_js_error)?;
        self.resolve(events)
    }

    pub fn apply_action_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = self.session.apply(&action).map_err(to_js_error)?;
        self.resolve(events)
    }

    pub fn end_turn(&mut self, player_id: u8) -> Result<String, JsValue> {
        let events = self.session.end_turn(player_id).map_err(to_js_error)?;
        self.resolve(events)
    }

    pub fn restart(&mut self) -> Result<String, JsValue> {
        let events = self.session.restart();
        self.resolve(events)
    }

    pub fn legal_targets(&self, attacker_id: u32) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.legal_attack_targets(attacker_id)).map_err(serde_to_js_error)
    }

    pub fn playable_cards(&self, player_id: u8) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.playable_cards(player_id)).map_err(serde_to_js_error)
    }

    pub fn pending_choice_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.pending_choice()).map_err(serde_to_js_error)
    }

    /// 上次调用以来的新事件。
    pub fn drain_events_json(&mut self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.drain_events()).map_err(serde_to_js_error)
    }

    pub fn apply_ai_move(
        &mut self,
        player_id: u8,
        difficulty: Option<String>,
        strategy: Option<String>,
    ) -> Result<String, JsValue> {
        known_player(self.session.state(), player_id)?;
        let mut agent = AiAgent::new(ai_config(difficulty.as_deref(), strategy.as_deref()));
        let decision = agent.decide_action(self.session.state(), player_id);

        let applied = match decision.action.as_ref() {
            Some(action) => {
                let events = self.session.apply(action).map_err(to_js_error)?;
                Some(RuleResolution::new(self.session.state().clone(), events))
            }
            None => None,
        };

        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// 由 AI 走完整个回合。
    pub fn play_ai_turn(
        &mut self,
        player_id: u8,
        difficulty: Option<String>,
        strategy: Option<String>,
    ) -> Result<String, JsValue> {
        known_player(self.session.state(), player_id)?;
        let mut agent = AiAgent::new(ai_config(difficulty.as_deref(), strategy.as_deref()));
        let events = agent.play_turn(&mut self.session, player_id);
        self.resolve(events)
    }

    pub fn think_ai(
        &self,
        player_id: u8,
        difficulty: Option<String>,
        strategy: Option<String>,
        delay_ms: Option<u32>,
    ) -> Promise {
        if let Err(error) = known_player(self.session.state(), player_id) {
            return Promise::reject(&error);
        }
        let state = self.session.state().clone();
        let config = ai_config(difficulty.as_deref(), strategy.as_deref());
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut agent = AiAgent::new(config);
            let decision = agent.decide_action(&state, player_id);
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }
}

/// 标准卡牌目录。
#[wasm_bindgen(js_name = "standardCatalog")]
pub fn standard_catalog_json() -> Result<String, JsValue> {
    serde_json::to_string(&*game::standard_catalog()).map_err(serde_to_js_error)
}

/// 校验并补全配置，返回规范化后的 JSON。
#[wasm_bindgen(js_name = "normalizeConfig")]
pub fn normalize_config(config_json: &str) -> Result<String, JsValue> {
    let config = GameConfig::from_json(config_json).map_err(serde_to_js_error)?;
    serde_json::to_string(&config).map_err(serde_to_js_error)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(
    state: JsValue,
    player_id: u8,
    difficulty: Option<String>,
    strategy: Option<String>,
) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    known_player(&state, player_id)?;
    let mut agent = AiAgent::new(ai_config(difficulty.as_deref(), strategy.as_deref()));
    let decision = agent.decide_action(&state, player_id);
    to_value(&decision).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
