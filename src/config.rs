//! 对局参数。

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid game config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be at least {min}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        value: u64,
    },
}

/// 对局参数，缺省值与原版游戏一致。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    pub max_hand_size: usize,
    pub max_field_size: usize,
    pub max_health: i32,
    pub max_mana: u8,
    pub starting_max_mana: u8,
    pub starting_hand_size: u32,
    pub max_turns: u32,
    pub discover_options: usize,
    /// 固定随机种子，测试与复盘使用。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_hand_size: 10,
            max_field_size: 7,
            max_health: 30,
            max_mana: 10,
            starting_max_mana: 0,
            starting_hand_size: 4,
            max_turns: 50,
            discover_options: 3,
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("max_hand_size", self.max_hand_size as u64),
            ("max_field_size", self.max_field_size as u64),
            ("max_health", self.max_health.max(0) as u64),
            ("max_mana", self.max_mana as u64),
            ("max_turns", self.max_turns as u64),
        ];
        for (field, value) in checks {
            if value < 1 {
                return Err(ConfigError::OutOfRange { field, min: 1, value });
            }
        }
        if self.starting_max_mana > self.max_mana {
            return Err(ConfigError::OutOfRange {
                field: "max_mana",
                min: self.starting_max_mana as u64,
                value: self.max_mana as u64,
            });
        }
        Ok(())
    }
}
