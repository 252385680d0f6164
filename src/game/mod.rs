//! 游戏核心逻辑模块（卡牌、状态、效果、战斗与规则引擎）。

pub mod card;
pub mod catalog;
pub mod choice;
pub mod combat;
pub mod effects;
pub mod rules;
pub mod session;
pub mod state;

pub use card::{
    AttackReadiness,
    CardInstance,
    CardTemplate,
    CardType,
    CostModifier,
    InstanceId,
    Keywords,
    Rarity,
    TemplateId,
};
pub use catalog::{sample_decks, standard_catalog, CardCatalog};
pub use choice::{AdaptOption, ChoiceKind, ChoiceToken, PendingChoice};
pub use combat::{AttackTarget, PendingAttack};
pub use effects::{
    EffectCondition,
    EffectContext,
    EffectDescriptor,
    EffectEngine,
    EffectKind,
    EffectTiming,
    TargetRef,
    TargetType,
};
pub use rules::{
    AttackAction,
    ChoiceAction,
    GameAction,
    PlayCardAction,
    RuleEngine,
    RuleError,
    RuleResolution,
};
pub use session::{GameSession, SessionError};
pub use state::{
    Field,
    GameEvent,
    GameOutcome,
    GamePhase,
    GameState,
    IntegrityError,
    OutcomeReason,
    Player,
    PlayerId,
    PLAYER_ONE,
    PLAYER_TWO,
};
