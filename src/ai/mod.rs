//! AI 模块：为非交互一方选择指令的启发式策略。

pub mod policy;

pub use policy::{AiAgent, AiConfig, AiDecision, AiDifficulty, AiStrategy};
