use std::str::FromStr;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::game::combat::{legal_attack_targets, ready_attackers};
use crate::game::{
    AttackAction, AttackTarget, CardInstance, CardTemplate, CardType, ChoiceAction, EffectKind, Field,
    GameAction, GameEvent, GameSession, GameState, InstanceId, PlayCardAction, PlayerId, RuleEngine,
    RuleError, RuleResolution, TargetRef,
};

/// 单回合内 AI 最多执行的指令数，超过后强制结束回合。
const MAX_ACTIONS_PER_TURN: usize = 40;
/// 模拟后局面下降超过该值的动作不予考虑。
const MIN_GAIN: f64 = -3.0;
const HEURISTIC_WEIGHT: f64 = 0.5;
/// 轮到自己行动时的局面加成。
const TEMPO_BONUS: f64 = 0.25;
const TARGETS_PER_SIDE: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Clock {
    timestamp: f64,
}

impl Clock {
    fn now() -> Self {
        Self {
            timestamp: now_ms(),
        }
    }

    fn elapsed(&self) -> Duration {
        Duration::from_millis((now_ms() - self.timestamp).max(0.0) as u64)
    }
}

#[cfg(target_arch = "wasm32")]
fn now_ms() -> f64 {
    web_sys::js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
fn now_ms() -> f64 {
    use once_cell::sync::Lazy;
    use std::time::Instant;

    static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);
    EPOCH.elapsed().as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiStrategy {
    Aggressive,
    Control,
    Combo,
    Random,
    Adaptive,
}

impl FromStr for AiStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aggressive" | "aggro" => Ok(AiStrategy::Aggressive),
            "control" => Ok(AiStrategy::Control),
            "combo" => Ok(AiStrategy::Combo),
            "random" => Ok(AiStrategy::Random),
            "adaptive" | "balanced" => Ok(AiStrategy::Adaptive),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    Normal,
    Hard,
    Expert,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "normal" | "medium" => Ok(AiDifficulty::Normal),
            "hard" => Ok(AiDifficulty::Hard),
            "expert" | "extreme" => Ok(AiDifficulty::Expert),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub randomness: f64,
    pub time_limit: Duration,
    pub strategy: AiStrategy,
    /// 优先使用伤害类法术清场。
    pub prefers_removal: bool,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        match difficulty {
            AiDifficulty::Easy => Self {
                randomness: 2.5,
                time_limit: Duration::from_millis(30),
                strategy: AiStrategy::Random,
                prefers_removal: false,
            },
            AiDifficulty::Normal => Self {
                randomness: 1.0,
                time_limit: Duration::from_millis(60),
                strategy: AiStrategy::Control,
                prefers_removal: false,
            },
            AiDifficulty::Hard => Self {
                randomness: 0.4,
                time_limit: Duration::from_millis(120),
                strategy: AiStrategy::Aggressive,
                prefers_removal: true,
            },
            AiDifficulty::Expert => Self {
                randomness: 0.0,
                time_limit: Duration::from_millis(200),
                strategy: AiStrategy::Adaptive,
                prefers_removal: true,
            },
        }
    }

    pub fn with_strategy(mut self, strategy: AiStrategy) -> Self {
        self.strategy = strategy;
        if matches!(self.strategy, AiStrategy::Random) {
            self.randomness = self.randomness.max(2.5);
        }
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Normal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<GameAction>,
    pub evaluation: f64,
    pub candidates: u32,
    pub timed_out: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<RuleResolution>,
    pub strategy: AiStrategy,
}

struct Candidate {
    action: GameAction,
    heuristic: f64,
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn idle(&self, state: &GameState, player_id: PlayerId, start: Clock) -> AiDecision {
        AiDecision {
            action: None,
            evaluation: self.evaluate(state, player_id),
            candidates: 0,
            timed_out: false,
            duration_ms: start.elapsed().as_millis() as u64,
            resolution: None,
            strategy: self.config.strategy,
        }
    }

    /// 选出下一条指令：先完成自己的挂起选择，其次出牌与攻击，无事可做时结束回合。
    pub fn decide_action(&mut self, state: &GameState, player_id: PlayerId) -> AiDecision {
        let start = Clock::now();
        if state.is_finished() || state.get_player(player_id).is_none() {
            return self.idle(state, player_id, start);
        }
        let mut candidates: Vec<Candidate> = match &state.pending_choice {
            Some(choice) if choice.owner == player_id => (0..choice.kind.option_count())
                .map(|option| Candidate {
                    action: GameAction::ResolveChoice(ChoiceAction {
                        player_id,
                        token: choice.token,
                        option,
                    }),
                    heuristic: 0.0,
                })
                .collect(),
            Some(_) => return self.idle(state, player_id, start),
            None if state.active_player != player_id => return self.idle(state, player_id, start),
            None => self.generate_candidates(state, player_id),
        };

        let seed = self.rng.gen::<u64>();
        let deadline = (!self.config.time_limit.is_zero()).then_some(self.config.time_limit);
        let baseline = self.evaluate(state, player_id);
        let mut best: Option<(f64, f64, GameAction, RuleResolution)> = None;
        let mut evaluated = 0u32;
        let mut timed_out = false;

        if self.config.strategy == AiStrategy::Random {
            candidates.shuffle(&mut self.rng);
        }

        for candidate in candidates {
            let Ok(resolution) = simulate(state, &candidate.action, seed) else {
                continue;
            };
            evaluated += 1;
            let evaluation = self.evaluate(&resolution.state, player_id);
            let is_choice = matches!(candidate.action, GameAction::ResolveChoice(_));
            if !is_choice && evaluation - baseline < MIN_GAIN {
                debug!(action = ?candidate.action, evaluation, baseline, "candidate rejected");
                continue;
            }
            let score = evaluation + candidate.heuristic * HEURISTIC_WEIGHT + self.random_noise();
            if best.as_ref().map_or(true, |(best_score, ..)| score > *best_score) {
                best = Some((score, evaluation, candidate.action, resolution));
            }
            if self.config.strategy == AiStrategy::Random {
                break;
            }
            if deadline.is_some_and(|limit| start.elapsed() >= limit) {
                timed_out = true;
                break;
            }
        }

        let (evaluation, action, resolution) = match best {
            Some((_, evaluation, action, resolution)) => (evaluation, action, Some(resolution)),
            None if state.pending_choice.is_none() => {
                let action = GameAction::EndTurn { player_id };
                let resolution = simulate(state, &action, seed).ok();
                (baseline, action, resolution)
            }
            None => return self.idle(state, player_id, start),
        };
        debug!(player = player_id, ?action, evaluation, evaluated, "ai decision");

        AiDecision {
            action: Some(action),
            evaluation,
            candidates: evaluated,
            timed_out,
            duration_ms: start.elapsed().as_millis() as u64,
            resolution,
            strategy: self.config.strategy,
        }
    }

    /// 代替玩家走完整个回合，返回期间产生的事件。
    pub fn play_turn(&mut self, session: &mut GameSession, player_id: PlayerId) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if session.player(player_id).is_none() {
            warn!(player = player_id, "ai asked to play for an unknown player");
            return events;
        }
        for _ in 0..MAX_ACTIONS_PER_TURN {
            let decision = self.decide_action(session.state(), player_id);
            let Some(action) = decision.action else {
                return events;
            };
            let ends_turn = matches!(action, GameAction::EndTurn { .. });
            match session.apply(&action) {
                Ok(produced) => events.extend(produced),
                Err(err) => {
                    warn!(?action, %err, "ai action rejected");
                    break;
                }
            }
            if ends_turn {
                return events;
            }
        }
        if !session.state().is_finished() && session.active_player() == player_id {
            warn!(player = player_id, "ai turn cut short");
            match session.end_turn(player_id) {
                Ok(produced) => events.extend(produced),
                Err(err) => warn!(%err, "ai could not end turn"),
            }
        }
        events
    }

    fn generate_candidates(&self, state: &GameState, player_id: PlayerId) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let player = state.player(player_id);
        let enemy = state.player(state.opponent_of(player_id));
        let rules = RuleEngine::with_seed(0);

        for instance_id in rules.playable_cards(state, player_id) {
            let Some(card) = player.find_in_hand(instance_id) else {
                continue;
            };
            let priority = self.card_priority(&card.template, enemy.field.count() > 0);
            let needs_target = card.template.immediate_effects().any(|effect| effect.requires_target());
            if !needs_target {
                candidates.push(Candidate {
                    action: GameAction::PlayCard(PlayCardAction::new(player_id, instance_id)),
                    heuristic: priority,
                });
                continue;
            }
            for (target, bonus) in spell_targets(state, player_id) {
                let action = PlayCardAction::new(player_id, instance_id).with_target(target);
                if rules.can_play(state, &action).is_ok() {
                    candidates.push(Candidate {
                        action: GameAction::PlayCard(action),
                        heuristic: priority + bonus,
                    });
                }
            }
        }

        for attacker_id in willing_attackers(state, player_id) {
            let Some(attacker) = state.creature(attacker_id) else {
                continue;
            };
            for target in legal_attack_targets(state, player_id, attacker_id) {
                let heuristic = match target {
                    AttackTarget::Hero => 0.0,
                    AttackTarget::Creature { id } => state
                        .creature(id)
                        .map(|defender| attack_target_priority(attacker, defender))
                        .unwrap_or_default(),
                };
                candidates.push(Candidate {
                    action: GameAction::AttackNow(AttackAction {
                        player_id,
                        attacker_id,
                        target,
                    }),
                    heuristic,
                });
            }
        }
        candidates
    }

    /// 出牌优先级：费用加身材，嘲讽与冲锋加成，高难度下偏好伤害法术。
    fn card_priority(&self, template: &CardTemplate, enemy_has_creatures: bool) -> f64 {
        let mut priority = template.cost as f64;
        if template.card_type == CardType::Creature {
            priority += (template.attack + template.health) as f64;
            if template.keywords.taunt {
                priority += 2.0;
            }
            if template.keywords.charge {
                priority += 2.0;
            }
        } else if self.config.prefers_removal && enemy_has_creatures {
            let removal = template
                .effects
                .iter()
                .filter(|effect| matches!(effect.kind, EffectKind::Damage | EffectKind::DestroyCreature))
                .count();
            priority += 3.0 * removal as f64;
        }
        priority
    }

    fn evaluate(&self, state: &GameState, player_id: PlayerId) -> f64 {
        if let Some(outcome) = &state.outcome {
            return match outcome.winner {
                Some(winner) if winner == player_id => 1_000_000.0,
                Some(_) => -1_000_000.0,
                None => 0.0,
            };
        }

        let (hero_diff, board_diff, hand_diff, mana_diff, combo_value) =
            evaluation_components(state, player_id);

        let weights = match self.config.strategy {
            AiStrategy::Adaptive => adaptive_weights(state, player_id, hero_diff, board_diff),
            strategy => StrategyWeights::fixed(strategy),
        };

        let turn_bonus = if state.active_player == player_id {
            TEMPO_BONUS
        } else {
            -TEMPO_BONUS
        };

        hero_diff * weights.hero
            + board_diff * weights.board
            + hand_diff * weights.hand
            + mana_diff * weights.mana
            + combo_value * weights.combo
            + turn_bonus
    }

    fn random_noise(&mut self) -> f64 {
        if self.config.randomness <= 0.0 {
            0.0
        } else {
            (self.rng.gen::<f64>() - self.rng.gen::<f64>()) * self.config.randomness
        }
    }
}

fn simulate(state: &GameState, action: &GameAction, seed: u64) -> Result<RuleResolution, RuleError> {
    let mut next_state = state.clone();
    let mut engine = RuleEngine::with_seed(seed);
    let events = engine.apply(&mut next_state, action)?;
    Ok(RuleResolution::new(next_state, events))
}

fn willing_attackers(state: &GameState, player_id: PlayerId) -> Vec<InstanceId> {
    ready_attackers(state, player_id)
        .into_iter()
        .filter(|id| state.creature(*id).is_some_and(|card| card.current_attack > 0))
        .collect()
}

/// 单体法术的候选目标：敌方生物按威胁排序，其后是双方英雄与己方生物。
fn spell_targets(state: &GameState, player_id: PlayerId) -> Vec<(TargetRef, f64)> {
    let enemy_id = state.opponent_of(player_id);
    let mut enemies: Vec<&CardInstance> = state.player(enemy_id).field.creatures().collect();
    enemies.sort_by(|a, b| target_priority(b).total_cmp(&target_priority(a)));

    let mut targets: Vec<(TargetRef, f64)> = enemies
        .into_iter()
        .take(TARGETS_PER_SIDE)
        .map(|card| (TargetRef::Creature { id: card.id }, target_priority(card)))
        .collect();
    targets.push((TargetRef::Hero { player: enemy_id }, 0.0));
    targets.extend(
        state
            .player(player_id)
            .field
            .creatures()
            .take(TARGETS_PER_SIDE)
            .map(|card| (TargetRef::Creature { id: card.id }, 0.0)),
    );
    targets.push((TargetRef::Hero { player: player_id }, 0.0));
    targets
}

fn target_priority(card: &CardInstance) -> f64 {
    let mut priority = card.current_attack as f64 * 2.0;
    if card.current_health <= 2 {
        priority += 3.0;
    }
    if card.is_taunting {
        priority += 5.0;
    }
    priority
}

/// 交换评分：能击杀、能存活、对方攻击力越高越好。
fn attack_target_priority(attacker: &CardInstance, defender: &CardInstance) -> f64 {
    let mut priority = 0.0;
    if attacker.current_attack >= defender.current_health {
        priority += 5.0 + defender.current_attack as f64;
    }
    if defender.current_attack < attacker.current_health {
        priority += 3.0;
    }
    priority + defender.current_attack as f64
}

fn board_value(field: &Field) -> f64 {
    field
        .creatures()
        .map(|card| {
            let atk = card.current_attack.max(0) as f64;
            let hp = card.current_health.max(0) as f64;
            let taunt = if card.is_taunting { 1.0 } else { 0.0 };
            atk * 1.6 + hp + taunt
        })
        .sum()
}

fn combo_potential(cards: &[CardInstance]) -> f64 {
    cards
        .iter()
        .map(|card| {
            let effect_score = card.template.effects.len() as f64;
            let spell_bonus = if card.template.card_type == CardType::Spell {
                1.0
            } else {
                0.0
            };
            effect_score * 0.8 + spell_bonus
        })
        .sum()
}

fn evaluation_components(state: &GameState, player_id: PlayerId) -> (f64, f64, f64, f64, f64) {
    let (Some(player), Some(opponent)) = (
        state.get_player(player_id),
        state.get_player(state.opponent_of(player_id)),
    ) else {
        return (0.0, 0.0, 0.0, 0.0, 0.0);
    };

    let hero_diff = (player.health - opponent.health) as f64;
    let board_diff = board_value(&player.field) - board_value(&opponent.field);
    let hand_diff = player.hand.len() as f64 - opponent.hand.len() as f64;
    let mana_diff = player.max_mana as f64 - opponent.max_mana as f64;
    let combo_value = combo_potential(&player.hand);

    (hero_diff, board_diff, hand_diff, mana_diff, combo_value)
}

#[derive(Debug, Clone, Copy)]
struct StrategyWeights {
    hero: f64,
    board: f64,
    hand: f64,
    mana: f64,
    combo: f64,
}

impl StrategyWeights {
    /// 英雄 30 血、场上 7 格、手牌上限 10 下的固定权重。
    fn fixed(strategy: AiStrategy) -> Self {
        match strategy {
            AiStrategy::Aggressive => StrategyWeights {
                hero: 3.4,
                board: 1.0,
                hand: 0.5,
                mana: 0.3,
                combo: 0.3,
            },
            AiStrategy::Control => StrategyWeights {
                hero: 0.9,
                board: 2.2,
                hand: 1.4,
                mana: 0.7,
                combo: 0.4,
            },
            AiStrategy::Combo => StrategyWeights {
                hero: 0.8,
                board: 1.3,
                hand: 1.5,
                mana: 0.8,
                combo: 2.2,
            },
            AiStrategy::Random | AiStrategy::Adaptive => StrategyWeights {
                hero: 1.0,
                board: 1.0,
                hand: 0.8,
                mana: 0.4,
                combo: 0.2,
            },
        }
    }
}

/// 血量进入斩杀线时重视英雄，敌方占据过半格子时重视场面，手牌将满时降低囤牌价值。
fn adaptive_weights(state: &GameState, player_id: PlayerId, hero_diff: f64, board_diff: f64) -> StrategyWeights {
    let config = &state.config;
    let own = state.get_player(player_id);
    let enemy = state.get_player(state.opponent_of(player_id));

    let in_lethal_range = own.is_some_and(|player| player.health <= config.max_health / 3);
    let hero = if in_lethal_range {
        2.4
    } else if hero_diff < 0.0 {
        1.8
    } else {
        1.2
    };

    let enemy_crowds_board = enemy.is_some_and(|player| player.field.count() * 2 > config.max_field_size);
    let mut board = if board_diff < 0.0 { 2.4 } else { 1.5 };
    if enemy_crowds_board {
        board += 0.4;
    }

    let hand_nearly_full = own.is_some_and(|player| player.hand.len() + 1 >= config.max_hand_size);
    let hand = if hand_nearly_full { 0.4 } else { 1.2 };

    StrategyWeights {
        hero,
        board,
        hand,
        mana: 0.7,
        combo: 0.9,
    }
}
