//! 效果解释器：目标解析、效果执行、触发登记与延迟队列。

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::card::{CardInstance, InstanceId, TemplateId};
use super::choice::{AdaptOption, ChoiceKind, PendingChoice};
use super::state::{opponent, GameEvent, GameState, PlayerId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Damage,
    Heal,
    DrawCard,
    GainMana,
    BuffAttack,
    BuffHealth,
    Summon,
    Silence,
    SwapAttackHealth,
    Freeze,
    Discover,
    MindControl,
    Adapt,
    DelayedEffect,
    DamageAll,
    BuffAllAttack,
    ApplyTaunt,
    GrantDivineShield,
    GrantStealth,
    DestroyCreature,
    SummonCopy,
    AddRandomCard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TargetType {
    #[default]
    None,
    SingleTarget,
    AllEnemies,
    AllAllies,
    AllCreatures,
    #[serde(rename = "Self")]
    SelfCard,
    RandomEnemy,
    RandomAlly,
    YourHero,
    EnemyHero,
}

/// 效果的前置条件，以施法者视角判断。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EffectCondition {
    #[default]
    None,
    IfHandEmpty,
    IfHandFull,
    IfBoardFull,
    IfEnemyHasMinions,
    IfYouHaveNoMinions,
}

impl EffectCondition {
    pub fn is_none(&self) -> bool {
        *self == EffectCondition::None
    }

    pub fn is_met(&self, caster: PlayerId, state: &GameState) -> bool {
        let you = state.player(caster);
        let enemy = state.player(opponent(caster));
        match self {
            EffectCondition::None => true,
            EffectCondition::IfHandEmpty => you.hand.is_empty(),
            EffectCondition::IfHandFull => you.hand.len() >= state.config.max_hand_size,
            EffectCondition::IfBoardFull => you.field.is_full(),
            EffectCondition::IfEnemyHasMinions => enemy.field.count() > 0,
            EffectCondition::IfYouHaveNoMinions => you.field.count() == 0,
        }
    }
}

/// 效果的触发时机，`Immediate` 在出牌时执行，其余登记到触发表。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum EffectTiming {
    #[default]
    Immediate,
    StartOfTurn,
    EndOfTurn,
    WhenDamaged,
    WhenSpellCast,
    OnDeath,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectDescriptor {
    pub kind: EffectKind,
    #[serde(default)]
    pub target: TargetType,
    #[serde(default)]
    pub magnitude: i32,
    /// 次要数值，召唤类效果表示数量。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<i32>,
    #[serde(default, skip_serializing_if = "EffectCondition::is_none")]
    pub condition: EffectCondition,
    #[serde(default)]
    pub timing: EffectTiming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub temporary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<TemplateId>,
    /// 随机取牌的候选池。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pool: Vec<TemplateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delayed: Option<Box<EffectDescriptor>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl EffectDescriptor {
    pub fn new(kind: EffectKind, target: TargetType, magnitude: i32) -> Self {
        Self {
            kind,
            target,
            magnitude,
            secondary: None,
            condition: EffectCondition::None,
            timing: EffectTiming::Immediate,
            duration: None,
            temporary: false,
            card: None,
            pool: Vec::new(),
            delayed: None,
            description: String::new(),
        }
    }

    pub fn with_timing(mut self, timing: EffectTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_condition(mut self, condition: EffectCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_secondary(mut self, secondary: i32) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_card(mut self, card: TemplateId) -> Self {
        self.card = Some(card);
        self
    }

    pub fn with_pool(mut self, pool: impl IntoIterator<Item = TemplateId>) -> Self {
        self.pool = pool.into_iter().collect();
        self
    }

    pub fn with_duration(mut self, turns: u32) -> Self {
        self.duration = Some(turns);
        self
    }

    /// 增益在 `turns` 个回合开始后撤销。
    pub fn temporary(mut self, turns: u32) -> Self {
        self.temporary = true;
        self.duration = Some(turns);
        self
    }

    pub fn with_delayed(mut self, effect: EffectDescriptor) -> Self {
        self.delayed = Some(Box::new(effect));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires_target(&self) -> bool {
        self.target == TargetType::SingleTarget
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, EffectKind::Discover | EffectKind::Adapt)
    }
}

/// 效果目标：场上生物或英雄。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type")]
pub enum TargetRef {
    Creature { id: InstanceId },
    Hero { player: PlayerId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub caster: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetRef>,
    /// 由触发表或延迟队列发起，不能再挂起选择。
    #[serde(default)]
    pub triggered: bool,
}

impl EffectContext {
    pub fn new(caster: PlayerId) -> Self {
        Self {
            caster,
            source: None,
            targets: Vec::new(),
            triggered: false,
        }
    }

    pub fn with_source(mut self, source: InstanceId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_targets(mut self, targets: Vec<TargetRef>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_target(mut self, target: TargetRef) -> Self {
        self.targets.push(target);
        self
    }

    pub fn triggered(mut self) -> Self {
        self.triggered = true;
        self
    }
}

/// 按目标类型解析目标列表，随机目标使用调用方提供的随机源。
pub fn resolve_targets<R: Rng + ?Sized>(
    target: TargetType,
    ctx: &EffectContext,
    state: &GameState,
    rng: &mut R,
) -> Vec<TargetRef> {
    let allies = || state.player(ctx.caster).field.ids();
    let enemies = || state.player(opponent(ctx.caster)).field.ids();
    let creatures = |ids: Vec<InstanceId>| -> Vec<TargetRef> {
        ids.into_iter().map(|id| TargetRef::Creature { id }).collect()
    };
    match target {
        TargetType::None => Vec::new(),
        TargetType::SingleTarget => ctx.targets.first().copied().into_iter().collect(),
        TargetType::AllEnemies => creatures(enemies()),
        TargetType::AllAllies => creatures(allies()),
        TargetType::AllCreatures => {
            let mut ids = allies();
            ids.extend(enemies());
            creatures(ids)
        }
        TargetType::SelfCard => ctx
            .source
            .filter(|id| state.creature(*id).is_some())
            .map(|id| TargetRef::Creature { id })
            .into_iter()
            .collect(),
        TargetType::RandomEnemy => creatures(enemies().choose(rng).copied().into_iter().collect()),
        TargetType::RandomAlly => creatures(allies().choose(rng).copied().into_iter().collect()),
        TargetType::YourHero => vec![TargetRef::Hero { player: ctx.caster }],
        TargetType::EnemyHero => vec![TargetRef::Hero {
            player: opponent(ctx.caster),
        }],
    }
}

fn creature_ids(targets: &[TargetRef]) -> Vec<InstanceId> {
    targets
        .iter()
        .filter_map(|target| match target {
            TargetRef::Creature { id } => Some(*id),
            TargetRef::Hero { .. } => None,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerEntry {
    pub timing: EffectTiming,
    pub owner: PlayerId,
    pub source: InstanceId,
    pub effect: EffectDescriptor,
}

/// 触发表：生物离场或被沉默时整体注销。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TriggerRegistry {
    entries: Vec<TriggerEntry>,
}

impl TriggerRegistry {
    pub fn register(&mut self, card: &CardInstance) {
        for effect in card.template.triggered_effects() {
            self.entries.push(TriggerEntry {
                timing: effect.timing,
                owner: card.owner,
                source: card.id,
                effect: effect.clone(),
            });
        }
    }

    pub fn remove_source(&mut self, source: InstanceId) {
        self.entries.retain(|entry| entry.source != source);
    }

    pub fn reassign_owner(&mut self, source: InstanceId, owner: PlayerId) {
        for entry in self.entries.iter_mut().filter(|entry| entry.source == source) {
            entry.owner = owner;
        }
    }

    pub fn matching(&self, timing: EffectTiming, owner: PlayerId) -> impl Iterator<Item = &TriggerEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.timing == timing && entry.owner == owner)
    }

    pub fn for_source(&self, timing: EffectTiming, source: InstanceId) -> impl Iterator<Item = &TriggerEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.timing == timing && entry.source == source)
    }

    pub fn has_source(&self, source: InstanceId) -> bool {
        self.entries.iter().any(|entry| entry.source == source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DelayedAction {
    Effect {
        effect: EffectDescriptor,
        context: EffectContext,
    },
    RevertAttack {
        instance: InstanceId,
        amount: i32,
    },
    RevertHealth {
        instance: InstanceId,
        amount: i32,
    },
}

impl DelayedAction {
    fn reverts(&self, id: InstanceId) -> bool {
        match self {
            DelayedAction::RevertAttack { instance, .. } | DelayedAction::RevertHealth { instance, .. } => {
                *instance == id
            }
            DelayedAction::Effect { .. } => false,
        }
    }
}

/// 延迟效果：每个回合开始倒数一次，归零时按登记顺序执行。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayedEffect {
    pub owner: PlayerId,
    pub turns_remaining: u32,
    pub action: DelayedAction,
}

/// 一次性的回合开始回调，只在 `owner` 的回合开始执行。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TurnStartHook {
    Unfreeze { owner: PlayerId, instance: InstanceId },
}

impl TurnStartHook {
    pub fn owner(&self) -> PlayerId {
        match self {
            TurnStartHook::Unfreeze { owner, .. } => *owner,
        }
    }

    pub fn instance(&self) -> InstanceId {
        match self {
            TurnStartHook::Unfreeze { instance, .. } => *instance,
        }
    }

    /// 随生物易主时改挂到新控制者名下。
    pub fn with_owner(self, owner: PlayerId) -> Self {
        match self {
            TurnStartHook::Unfreeze { instance, .. } => TurnStartHook::Unfreeze { owner, instance },
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedTrigger {
    effect: EffectDescriptor,
    context: EffectContext,
    requires_source: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Continue,
    Suspend(ChoiceKind),
}

/// 效果执行器：持有随机源与触发队列，所有修改同步完成。
pub struct EffectEngine {
    rng: SmallRng,
    queue: VecDeque<QueuedTrigger>,
}

impl Default for EffectEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectEngine {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
            queue: VecDeque::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            queue: VecDeque::new(),
        }
    }

    pub fn rng_mut(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// 依次执行效果序列；遇到选择类效果时挂起，剩余效果保存在待选项中。
    pub fn apply_sequence(
        &mut self,
        state: &mut GameState,
        effects: Vec<EffectDescriptor>,
        ctx: EffectContext,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let mut remaining = effects.into_iter();
        while let Some(effect) = remaining.next() {
            if state.is_finished() {
                break;
            }
            let step = self.apply(state, &effect, &ctx, &mut events);
            events.extend(self.settle(state));
            if let Step::Suspend(kind) = step {
                if state.is_finished() {
                    break;
                }
                let token = state.issue_choice_token();
                debug!(token, player = ctx.caster, ?kind, "choice requested");
                events.push(GameEvent::ChoiceRequested {
                    token,
                    player_id: ctx.caster,
                    kind: kind.clone(),
                });
                state.pending_choice = Some(PendingChoice {
                    token,
                    owner: ctx.caster,
                    kind,
                    context: ctx,
                    resume: remaining.collect(),
                });
                break;
            }
        }
        events
    }

    /// 应用玩家的选择并继续执行挂起的效果序列。
    pub fn complete_choice(
        &mut self,
        state: &mut GameState,
        choice: PendingChoice,
        option: usize,
    ) -> Vec<GameEvent> {
        let mut events = vec![GameEvent::ChoiceResolved {
            token: choice.token,
            option,
        }];
        match &choice.kind {
            ChoiceKind::Discover { options } => {
                if let Some(template) = options.get(option).and_then(|id| state.catalog.get(*id)) {
                    let card = state.instantiate(template, choice.owner);
                    events.push(state.add_to_hand(choice.owner, card));
                }
            }
            ChoiceKind::Adapt { target, options } => {
                let card = target.and_then(|id| state.creature_mut(id));
                match (card, options.get(option)) {
                    (Some(card), Some(adapt)) => {
                        debug!(instance = card.id, option = adapt.label(), "adapt");
                        adapt.apply(card);
                    }
                    _ => debug!("adapt target left the field"),
                }
            }
        }
        events.extend(self.settle(state));
        events.extend(self.apply_sequence(state, choice.resume, choice.context));
        events
    }

    /// 触发某一时机下 `owner` 登记的全部效果。
    pub fn fire(&mut self, state: &mut GameState, timing: EffectTiming, owner: PlayerId) -> Vec<GameEvent> {
        let queued: Vec<QueuedTrigger> = state
            .triggers
            .matching(timing, owner)
            .map(|entry| QueuedTrigger {
                effect: entry.effect.clone(),
                context: EffectContext::new(entry.owner).with_source(entry.source).triggered(),
                requires_source: true,
            })
            .collect();
        self.queue.extend(queued);
        self.settle(state)
    }

    /// 对生物造成伤害，生命值可以为负，死亡检查由 `settle` 统一处理。
    pub fn damage_creature(
        &mut self,
        state: &mut GameState,
        id: InstanceId,
        amount: i32,
        source: Option<InstanceId>,
    ) -> Vec<GameEvent> {
        if amount <= 0 {
            return Vec::new();
        }
        let Some(card) = state.creature_mut(id) else {
            return Vec::new();
        };
        card.current_health = card.current_health.saturating_sub(amount);
        let queued: Vec<QueuedTrigger> = state
            .triggers
            .for_source(EffectTiming::WhenDamaged, id)
            .map(|entry| QueuedTrigger {
                effect: entry.effect.clone(),
                context: EffectContext::new(entry.owner).with_source(id).triggered(),
                requires_source: true,
            })
            .collect();
        self.queue.extend(queued);
        vec![GameEvent::DamageApplied {
            target: TargetRef::Creature { id },
            amount,
            source,
        }]
    }

    /// 清空触发队列并移除死亡生物，直到局面稳定。
    pub fn settle(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        loop {
            while let Some(item) = self.queue.pop_front() {
                if state.is_finished() {
                    self.queue.clear();
                    break;
                }
                let source_present = item
                    .context
                    .source
                    .is_some_and(|id| state.creature(id).is_some());
                if item.requires_source && !source_present {
                    continue;
                }
                self.apply(state, &item.effect, &item.context, &mut events);
            }
            let deaths = self.collect_deaths(state);
            if deaths.is_empty() && self.queue.is_empty() {
                break;
            }
            events.extend(deaths);
        }
        events
    }

    /// 回合开始：执行该玩家的一次性回调（解冻）。
    pub fn run_turn_start_hooks(&mut self, state: &mut GameState, player: PlayerId) {
        let (due, kept): (Vec<TurnStartHook>, Vec<TurnStartHook>) =
            std::mem::take(&mut state.turn_start_hooks)
                .into_iter()
                .partition(|hook| hook.owner() == player);
        state.turn_start_hooks = kept;
        for hook in due {
            match hook {
                TurnStartHook::Unfreeze { instance, .. } => {
                    if let Some(card) = state.creature_mut(instance) {
                        card.is_frozen = false;
                        debug!(instance, "unfrozen");
                    }
                }
            }
        }
    }

    /// 延迟队列倒数一次，归零的条目按登记顺序执行并移除。
    pub fn run_delayed(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        let mut due = Vec::new();
        for mut entry in std::mem::take(&mut state.delayed_effects) {
            entry.turns_remaining = entry.turns_remaining.saturating_sub(1);
            if entry.turns_remaining == 0 {
                due.push(entry);
            } else {
                state.delayed_effects.push(entry);
            }
        }
        let mut events = Vec::new();
        for entry in due {
            if state.is_finished() {
                break;
            }
            match entry.action {
                DelayedAction::Effect { effect, context } => {
                    debug!(owner = entry.owner, kind = ?effect.kind, "delayed effect fires");
                    self.apply(state, &effect, &context.triggered(), &mut events);
                }
                DelayedAction::RevertAttack { instance, amount } => {
                    if let Some(card) = state.creature_mut(instance) {
                        card.buff_attack(amount.saturating_neg());
                    }
                }
                DelayedAction::RevertHealth { instance, amount } => {
                    if let Some(card) = state.creature_mut(instance) {
                        card.revert_health_buff(amount);
                    }
                }
            }
            events.extend(self.settle(state));
        }
        events
    }

    fn collect_deaths(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        let active = state.active_player;
        let dead: Vec<InstanceId> = [active, opponent(active)]
            .into_iter()
            .flat_map(|player| {
                state
                    .player(player)
                    .field
                    .creatures()
                    .filter(|card| card.is_dead())
                    .map(|card| card.id)
                    .collect::<Vec<_>>()
            })
            .collect();
        let mut events = Vec::new();
        for id in dead {
            if !state.is_finished() {
                let queued: Vec<QueuedTrigger> = state
                    .triggers
                    .for_source(EffectTiming::OnDeath, id)
                    .map(|entry| QueuedTrigger {
                        effect: entry.effect.clone(),
                        context: EffectContext::new(entry.owner).with_source(id).triggered(),
                        requires_source: false,
                    })
                    .collect();
                self.queue.extend(queued);
            }
            events.extend(state.remove_from_field(id));
        }
        events
    }

    fn schedule_revert(state: &mut GameState, effect: &EffectDescriptor, owner: PlayerId, action: DelayedAction) {
        state.delayed_effects.push(DelayedEffect {
            owner,
            turns_remaining: effect.duration.unwrap_or(1).max(1),
            action,
        });
    }

    fn apply(
        &mut self,
        state: &mut GameState,
        effect: &EffectDescriptor,
        ctx: &EffectContext,
        events: &mut Vec<GameEvent>,
    ) -> Step {
        if !effect.condition.is_met(ctx.caster, state) {
            debug!(kind = ?effect.kind, condition = ?effect.condition, "condition not met");
            return Step::Continue;
        }
        if effect.requires_target() && ctx.targets.is_empty() {
            warn!(kind = ?effect.kind, "single-target effect without a target, skipped");
            return Step::Continue;
        }
        let targets = resolve_targets(effect.target, ctx, state, &mut self.rng);
        let amount = effect.magnitude;
        match effect.kind {
            EffectKind::Damage => {
                for target in targets {
                    if state.is_finished() {
                        break;
                    }
                    match target {
                        TargetRef::Creature { id } => {
                            events.extend(self.damage_creature(state, id, amount, ctx.source))
                        }
                        TargetRef::Hero { player } => {
                            events.extend(state.damage_hero(player, amount, ctx.source))
                        }
                    }
                }
            }
            EffectKind::DamageAll => {
                let mut ids = state.player(ctx.caster).field.ids();
                ids.extend(state.player(opponent(ctx.caster)).field.ids());
                for id in ids {
                    events.extend(self.damage_creature(state, id, amount, ctx.source));
                }
            }
            EffectKind::Heal => {
                for target in targets {
                    match target {
                        TargetRef::Creature { id } => {
                            if let Some(card) = state.creature_mut(id) {
                                let healed = card.heal(amount);
                                events.push(GameEvent::HealApplied {
                                    target,
                                    amount: healed,
                                });
                            }
                        }
                        TargetRef::Hero { player } => events.extend(state.heal_hero(player, amount)),
                    }
                }
            }
            EffectKind::DrawCard => {
                let count = amount.max(0) as u32;
                let heroes: Vec<PlayerId> = targets
                    .iter()
                    .filter_map(|target| match target {
                        TargetRef::Hero { player } => Some(*player),
                        TargetRef::Creature { .. } => None,
                    })
                    .collect();
                if heroes.is_empty() {
                    events.extend(state.draw_cards(ctx.caster, count));
                } else {
                    for player in heroes {
                        events.extend(state.draw_cards(player, count));
                    }
                }
            }
            EffectKind::GainMana => {
                let gain = amount.clamp(0, u8::MAX as i32) as u8;
                state.player_mut(ctx.caster).gain_mana(gain);
            }
            EffectKind::BuffAttack | EffectKind::BuffAllAttack => {
                let ids = if effect.kind == EffectKind::BuffAllAttack {
                    state.player(ctx.caster).field.ids()
                } else {
                    creature_ids(&targets)
                };
                for id in ids {
                    let Some(card) = state.creature_mut(id) else {
                        continue;
                    };
                    card.buff_attack(amount);
                    if effect.temporary {
                        let action = DelayedAction::RevertAttack { instance: id, amount };
                        Self::schedule_revert(state, effect, ctx.caster, action);
                    }
                }
            }
            EffectKind::BuffHealth => {
                for id in creature_ids(&targets) {
                    let Some(card) = state.creature_mut(id) else {
                        continue;
                    };
                    card.buff_health(amount);
                    if effect.temporary {
                        let action = DelayedAction::RevertHealth { instance: id, amount };
                        Self::schedule_revert(state, effect, ctx.caster, action);
                    }
                }
            }
            EffectKind::Summon => self.summon_from_catalog(state, effect, ctx.caster, events),
            EffectKind::AddRandomCard => self.add_random_card(state, effect, ctx.caster, events),
            EffectKind::SummonCopy => {
                for id in creature_ids(&targets) {
                    let Some(original) = state.creature(id).cloned() else {
                        continue;
                    };
                    let copy = state.copy_instance(&original, ctx.caster);
                    match state.summon(ctx.caster, copy, None) {
                        Ok(event) => events.push(event),
                        Err(_) => debug!(player = ctx.caster, "no free slot for copy"),
                    }
                }
            }
            EffectKind::Silence => {
                for id in creature_ids(&targets) {
                    let Some(card) = state.creature_mut(id) else {
                        continue;
                    };
                    card.silence();
                    state.triggers.remove_source(id);
                    state.turn_start_hooks.retain(|hook| hook.instance() != id);
                    state.delayed_effects.retain(|entry| !entry.action.reverts(id));
                    debug!(instance = id, "silenced");
                }
            }
            EffectKind::SwapAttackHealth => {
                for id in creature_ids(&targets) {
                    if let Some(card) = state.creature_mut(id) {
                        card.swap_attack_health();
                    }
                }
            }
            EffectKind::Freeze => {
                for id in creature_ids(&targets) {
                    let Some(card) = state.creature_mut(id) else {
                        continue;
                    };
                    card.is_frozen = true;
                    let owner = card.owner;
                    state.turn_start_hooks.retain(|hook| hook.instance() != id);
                    state
                        .turn_start_hooks
                        .push(TurnStartHook::Unfreeze { owner, instance: id });
                }
            }
            EffectKind::ApplyTaunt => {
                for id in creature_ids(&targets) {
                    if let Some(card) = state.creature_mut(id) {
                        card.is_taunting = true;
                    }
                }
            }
            EffectKind::GrantDivineShield => {
                for id in creature_ids(&targets) {
                    if let Some(card) = state.creature_mut(id) {
                        card.is_divine = true;
                    }
                }
            }
            EffectKind::GrantStealth => {
                for id in creature_ids(&targets) {
                    if let Some(card) = state.creature_mut(id) {
                        card.is_stealth = true;
                    }
                }
            }
            EffectKind::DestroyCreature => {
                for id in creature_ids(&targets) {
                    if let Some(card) = state.creature_mut(id) {
                        card.current_health = card.current_health.min(0);
                    }
                }
            }
            EffectKind::MindControl => {
                for id in creature_ids(&targets) {
                    self.take_control(state, id, ctx.caster, events);
                }
            }
            EffectKind::DelayedEffect => match effect.delayed.as_deref() {
                Some(inner) => state.delayed_effects.push(DelayedEffect {
                    owner: ctx.caster,
                    turns_remaining: effect.duration.unwrap_or(1),
                    action: DelayedAction::Effect {
                        effect: inner.clone(),
                        context: ctx.clone().triggered(),
                    },
                }),
                None => warn!("delayed effect without a payload, skipped"),
            },
            EffectKind::Discover => {
                if !self.can_suspend(state, ctx, effect.kind) {
                    return Step::Continue;
                }
                let pool = state.catalog.collectible();
                let options: Vec<TemplateId> = pool
                    .choose_multiple(&mut self.rng, state.config.discover_options)
                    .copied()
                    .collect();
                if options.is_empty() {
                    warn!("discover with an empty catalog, skipped");
                    return Step::Continue;
                }
                return Step::Suspend(ChoiceKind::Discover { options });
            }
            EffectKind::Adapt => {
                if !self.can_suspend(state, ctx, effect.kind) {
                    return Step::Continue;
                }
                let Some(target) = creature_ids(&targets).first().copied() else {
                    warn!("adapt without a creature target, skipped");
                    return Step::Continue;
                };
                return Step::Suspend(ChoiceKind::Adapt {
                    target: Some(target),
                    options: AdaptOption::ALL.to_vec(),
                });
            }
        }
        Step::Continue
    }

    fn can_suspend(&self, state: &GameState, ctx: &EffectContext, kind: EffectKind) -> bool {
        if ctx.triggered || state.pending_choice.is_some() {
            warn!(?kind, "choice effect outside a player action, skipped");
            return false;
        }
        true
    }

    fn summon_from_catalog(
        &mut self,
        state: &mut GameState,
        effect: &EffectDescriptor,
        owner: PlayerId,
        events: &mut Vec<GameEvent>,
    ) {
        let Some(template) = effect.card.and_then(|id| state.catalog.get(id)) else {
            warn!(card = ?effect.card, "summon references an unknown card, skipped");
            return;
        };
        let count = effect.secondary.unwrap_or(1).max(1);
        for _ in 0..count {
            if state.player(owner).field.is_full() {
                debug!(player = owner, "field full, summon stops");
                break;
            }
            let card = state.instantiate(Arc::clone(&template), owner);
            match state.summon(owner, card, None) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
    }

    fn add_random_card(
        &mut self,
        state: &mut GameState,
        effect: &EffectDescriptor,
        owner: PlayerId,
        events: &mut Vec<GameEvent>,
    ) {
        let count = effect.secondary.unwrap_or(1).max(1);
        for _ in 0..count {
            let Some(id) = effect.pool.choose(&mut self.rng).copied() else {
                warn!("random card effect with an empty pool, skipped");
                return;
            };
            let Some(template) = state.catalog.get(id) else {
                warn!(card = id, "random card pool references an unknown card, skipped");
                continue;
            };
            let card = state.instantiate(template, owner);
            events.push(state.add_to_hand(owner, card));
        }
    }

    fn take_control(&mut self, state: &mut GameState, id: InstanceId, new_owner: PlayerId, events: &mut Vec<GameEvent>) {
        let Some((from, _)) = state.locate(id) else {
            return;
        };
        if from == new_owner {
            return;
        }
        let Some(slot) = state.player(new_owner).field.first_free() else {
            debug!(player = new_owner, "no free slot, mind control fizzles");
            return;
        };
        let Some(mut card) = state.take_from_field(id) else {
            return;
        };
        card.owner = new_owner;
        card.can_attack_this_turn = false;
        card.has_attacked_this_turn = false;
        if let Err(card) = state.player_mut(new_owner).field.place(slot, card) {
            state.player_mut(from).graveyard.push(card);
            return;
        }
        state.triggers.reassign_owner(id, new_owner);
        for hook in state.turn_start_hooks.iter_mut() {
            if hook.instance() == id {
                *hook = hook.with_owner(new_owner);
            }
        }
        events.push(GameEvent::CreatureStolen {
            from,
            to: new_owner,
            instance_id: id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::card::AttackReadiness;
    use crate::game::catalog::{standard_catalog, DAMAGED_GOLEM, MECH_ENGINEER, MECH_POOL};
    use crate::game::state::{PLAYER_ONE, PLAYER_TWO};

    fn empty_state() -> GameState {
        GameState::new(GameConfig::default(), standard_catalog(), [Vec::new(), Vec::new()])
    }

    fn place(state: &mut GameState, player: PlayerId, template: TemplateId) -> InstanceId {
        let template = state.catalog.get(template).expect("known card");
        let card = state.instantiate(template, player);
        let id = card.id;
        state.summon(player, card, None).expect("free slot");
        id
    }

    fn cast(engine: &mut EffectEngine, state: &mut GameState, effect: EffectDescriptor, ctx: EffectContext) -> Vec<GameEvent> {
        engine.apply_sequence(state, vec![effect], ctx)
    }

    #[test]
    fn all_creatures_resolves_allies_then_enemies() {
        let mut state = empty_state();
        let enemy = place(&mut state, PLAYER_TWO, 1);
        let ally = place(&mut state, PLAYER_ONE, 2);
        let mut rng = SmallRng::seed_from_u64(1);
        let targets = resolve_targets(TargetType::AllCreatures, &EffectContext::new(PLAYER_ONE), &state, &mut rng);
        assert_eq!(
            targets,
            vec![TargetRef::Creature { id: ally }, TargetRef::Creature { id: enemy }]
        );
    }

    #[test]
    fn random_enemy_on_empty_field_is_a_no_op() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let before = state.clone();
        let effect = EffectDescriptor::new(EffectKind::Damage, TargetType::RandomEnemy, 3);
        let events = cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        assert!(events.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn single_target_without_target_degrades_to_no_op() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        place(&mut state, PLAYER_TWO, 5);
        let before = state.clone();
        let effect = EffectDescriptor::new(EffectKind::Damage, TargetType::SingleTarget, 6);
        cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        assert_eq!(state, before);
    }

    #[test]
    fn lethal_damage_goes_negative_then_creature_dies() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let target = place(&mut state, PLAYER_TWO, 2);
        engine.damage_creature(&mut state, target, 6, None);
        assert_eq!(state.creature(target).map(|c| c.current_health), Some(-4));
        let events = engine.settle(&mut state);
        assert!(state.creature(target).is_none());
        assert_eq!(state.player(PLAYER_TWO).graveyard.len(), 1);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::CreatureDied { instance_id, .. } if *instance_id == target)));
    }

    #[test]
    fn heal_is_capped_at_current_max() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let yeti = place(&mut state, PLAYER_ONE, 5);
        if let Some(card) = state.creature_mut(yeti) {
            card.current_health = 1;
        }
        let effect = EffectDescriptor::new(EffectKind::Heal, TargetType::SingleTarget, 8);
        let ctx = EffectContext::new(PLAYER_ONE).with_target(TargetRef::Creature { id: yeti });
        cast(&mut engine, &mut state, effect, ctx);
        assert_eq!(state.creature(yeti).map(|c| c.current_health), Some(5));
    }

    #[test]
    fn freeze_clears_on_owner_turn_start_only() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let target = place(&mut state, PLAYER_TWO, 5);
        let effect = EffectDescriptor::new(EffectKind::Freeze, TargetType::SingleTarget, 0);
        let ctx = EffectContext::new(PLAYER_ONE).with_target(TargetRef::Creature { id: target });
        cast(&mut engine, &mut state, effect, ctx);
        let frozen = |state: &GameState| state.creature(target).map(|c| c.is_frozen);
        assert_eq!(frozen(&state), Some(true));
        assert_eq!(
            state.creature(target).map(|c| c.readiness()),
            Some(AttackReadiness::Frozen)
        );
        engine.run_turn_start_hooks(&mut state, PLAYER_ONE);
        assert_eq!(frozen(&state), Some(true));
        engine.run_turn_start_hooks(&mut state, PLAYER_TWO);
        assert_eq!(frozen(&state), Some(false));
        assert!(state.turn_start_hooks.is_empty());
    }

    #[test]
    fn deathrattle_summons_into_owners_field() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let golem = place(&mut state, PLAYER_TWO, 13);
        let effect = EffectDescriptor::new(EffectKind::Damage, TargetType::SingleTarget, 5);
        let ctx = EffectContext::new(PLAYER_ONE).with_target(TargetRef::Creature { id: golem });
        cast(&mut engine, &mut state, effect, ctx);
        let field = &state.player(PLAYER_TWO).field;
        assert!(field.find(golem).is_none());
        let survivors: Vec<TemplateId> = field.creatures().map(|c| c.template_id()).collect();
        assert_eq!(survivors, vec![DAMAGED_GOLEM]);
        assert!(state.triggers.is_empty());
    }

    #[test]
    fn silence_unsubscribes_deathrattle() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let golem = place(&mut state, PLAYER_TWO, 13);
        let ctx = EffectContext::new(PLAYER_ONE).with_target(TargetRef::Creature { id: golem });
        engine.apply_sequence(
            &mut state,
            vec![
                EffectDescriptor::new(EffectKind::Silence, TargetType::SingleTarget, 0),
                EffectDescriptor::new(EffectKind::Damage, TargetType::SingleTarget, 5),
            ],
            ctx,
        );
        assert_eq!(state.player(PLAYER_TWO).field.count(), 0);
    }

    #[test]
    fn damage_trigger_buffs_berserker() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let berserker = place(&mut state, PLAYER_ONE, 11);
        let effect = EffectDescriptor::new(EffectKind::DamageAll, TargetType::None, 1);
        cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_TWO));
        let card = state.creature(berserker).expect("survives");
        assert_eq!(card.current_attack, 4);
        assert_eq!(card.current_health, 3);
    }

    #[test]
    fn delayed_effect_fires_after_countdown() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let effect = EffectDescriptor::new(EffectKind::DelayedEffect, TargetType::None, 0)
            .with_duration(2)
            .with_delayed(EffectDescriptor::new(EffectKind::Damage, TargetType::EnemyHero, 5));
        cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        engine.run_delayed(&mut state);
        assert_eq!(state.player(PLAYER_TWO).health, 30);
        assert_eq!(state.delayed_effects.len(), 1);
        engine.run_delayed(&mut state);
        assert_eq!(state.player(PLAYER_TWO).health, 25);
        assert!(state.delayed_effects.is_empty());
    }

    #[test]
    fn temporary_buff_is_reverted() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let raptor = place(&mut state, PLAYER_ONE, 2);
        let effect = EffectDescriptor::new(EffectKind::BuffAllAttack, TargetType::AllAllies, 3).temporary(1);
        cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        assert_eq!(state.creature(raptor).map(|c| c.current_attack), Some(6));
        engine.run_delayed(&mut state);
        assert_eq!(state.creature(raptor).map(|c| c.current_attack), Some(3));
    }

    #[test]
    fn discover_suspends_and_resumes_remaining_effects() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(9);
        let filler = state.catalog.get(1).expect("known card");
        let card = state.instantiate(filler, PLAYER_ONE);
        state.player_mut(PLAYER_ONE).deck.push(card);
        let effects = vec![
            EffectDescriptor::new(EffectKind::Discover, TargetType::None, 0),
            EffectDescriptor::new(EffectKind::DrawCard, TargetType::None, 1),
        ];
        let events = engine.apply_sequence(&mut state, effects, EffectContext::new(PLAYER_ONE));
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::ChoiceRequested { .. })));
        assert!(state.player(PLAYER_ONE).hand.is_empty());
        let choice = state.pending_choice.take().expect("pending choice");
        let ChoiceKind::Discover { options } = &choice.kind else {
            panic!("expected discover");
        };
        assert_eq!(options.len(), 3);
        let picked = options[1];
        engine.complete_choice(&mut state, choice, 1);
        let hand: Vec<TemplateId> = state.player(PLAYER_ONE).hand.iter().map(|c| c.template_id()).collect();
        assert_eq!(hand, vec![picked, 1]);
    }

    #[test]
    fn triggered_choice_effects_are_skipped() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(9);
        let effect = EffectDescriptor::new(EffectKind::Discover, TargetType::None, 0);
        cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE).triggered());
        assert!(state.pending_choice.is_none());
    }

    #[test]
    fn mind_control_moves_the_same_instance() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let wyrm = place(&mut state, PLAYER_TWO, 15);
        let effect = EffectDescriptor::new(EffectKind::MindControl, TargetType::SingleTarget, 0);
        let ctx = EffectContext::new(PLAYER_ONE).with_target(TargetRef::Creature { id: wyrm });
        cast(&mut engine, &mut state, effect, ctx);
        assert!(state.player(PLAYER_TWO).field.find(wyrm).is_none());
        let card = state.player(PLAYER_ONE).field.find(wyrm).expect("moved");
        assert_eq!(card.owner, PLAYER_ONE);
        assert_eq!(card.readiness(), AttackReadiness::Dormant);
        assert_eq!(
            state
                .triggers
                .matching(EffectTiming::WhenSpellCast, PLAYER_ONE)
                .count(),
            1
        );
    }

    #[test]
    fn stolen_frozen_creature_thaws_on_new_owners_turn() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let yeti = place(&mut state, PLAYER_TWO, 5);
        let target = EffectContext::new(PLAYER_ONE).with_target(TargetRef::Creature { id: yeti });
        let freeze = EffectDescriptor::new(EffectKind::Freeze, TargetType::SingleTarget, 0);
        cast(&mut engine, &mut state, freeze, target.clone());
        let steal = EffectDescriptor::new(EffectKind::MindControl, TargetType::SingleTarget, 0);
        cast(&mut engine, &mut state, steal, target);
        assert_eq!(state.turn_start_hooks[0].owner(), PLAYER_ONE);
        let frozen = |state: &GameState| state.creature(yeti).map(|c| c.is_frozen);
        engine.run_turn_start_hooks(&mut state, PLAYER_TWO);
        assert_eq!(frozen(&state), Some(true));
        engine.run_turn_start_hooks(&mut state, PLAYER_ONE);
        assert_eq!(frozen(&state), Some(false));
        assert!(state.turn_start_hooks.is_empty());
    }

    #[test]
    fn mech_engineer_adds_a_card_from_its_pool() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(11);
        let effects = state.catalog.get(MECH_ENGINEER).expect("known card").effects.clone();
        let events = engine.apply_sequence(&mut state, effects, EffectContext::new(PLAYER_ONE));
        let hand = &state.player(PLAYER_ONE).hand;
        assert_eq!(hand.len(), 1);
        assert!(MECH_POOL.contains(&hand[0].template_id()));
        assert!(matches!(
            events.as_slice(),
            [GameEvent::CardDrawn { player_id: PLAYER_ONE, .. }]
        ));

        let mut replay_state = empty_state();
        let mut replay = EffectEngine::with_seed(11);
        let effects = replay_state.catalog.get(MECH_ENGINEER).expect("known card").effects.clone();
        replay.apply_sequence(&mut replay_state, effects, EffectContext::new(PLAYER_ONE));
        assert_eq!(
            replay_state.player(PLAYER_ONE).hand[0].template_id(),
            state.player(PLAYER_ONE).hand[0].template_id()
        );
    }

    #[test]
    fn random_card_burns_when_hand_is_full() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(5);
        let filler = state.catalog.get(1).expect("known card");
        for _ in 0..state.config.max_hand_size {
            let card = state.instantiate(Arc::clone(&filler), PLAYER_ONE);
            state.player_mut(PLAYER_ONE).hand.push(card);
        }
        let effect = EffectDescriptor::new(EffectKind::AddRandomCard, TargetType::None, 0).with_pool(MECH_POOL);
        let events = cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        assert_eq!(state.player(PLAYER_ONE).hand.len(), state.config.max_hand_size);
        let burned = &state.player(PLAYER_ONE).graveyard;
        assert_eq!(burned.len(), 1);
        assert!(MECH_POOL.contains(&burned[0].template_id()));
        assert!(matches!(events.as_slice(), [GameEvent::CardBurned { .. }]));
    }

    #[test]
    fn random_card_with_empty_pool_is_a_no_op() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(5);
        let before = state.clone();
        let effect = EffectDescriptor::new(EffectKind::AddRandomCard, TargetType::None, 0);
        let events = cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        assert!(events.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn unmet_condition_skips_descriptor() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let effect = EffectDescriptor::new(EffectKind::Damage, TargetType::EnemyHero, 4)
            .with_condition(EffectCondition::IfEnemyHasMinions);
        cast(&mut engine, &mut state, effect.clone(), EffectContext::new(PLAYER_ONE));
        assert_eq!(state.player(PLAYER_TWO).health, 30);
        place(&mut state, PLAYER_TWO, 1);
        cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        assert_eq!(state.player(PLAYER_TWO).health, 26);
    }

    #[test]
    fn gain_mana_is_capped_at_max() {
        let mut state = empty_state();
        let mut engine = EffectEngine::with_seed(3);
        let player = state.player_mut(PLAYER_ONE);
        player.max_mana = 4;
        player.current_mana = 3;
        let effect = EffectDescriptor::new(EffectKind::GainMana, TargetType::None, 2);
        cast(&mut engine, &mut state, effect, EffectContext::new(PLAYER_ONE));
        assert_eq!(state.player(PLAYER_ONE).current_mana, 4);
    }
}
