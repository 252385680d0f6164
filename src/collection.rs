//! 玩家收藏（卡牌持有数量）与命名卡组。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::card::{CardTemplate, TemplateId};
use crate::game::catalog::CardCatalog;

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("card {id} is not in the catalog")]
    UnknownCard { id: TemplateId },
    #[error("card {id}: {required} copies needed, {owned} owned")]
    NotEnoughCopies {
        id: TemplateId,
        owned: u32,
        required: u32,
    },
    #[error("card {id} appears {count} times, at most {max} allowed")]
    TooManyCopies { id: TemplateId, count: u32, max: u32 },
    #[error("deck has {size} cards, must be between 1 and {max}")]
    InvalidDeckSize { size: usize, max: usize },
    #[error("no deck named {name:?}")]
    UnknownDeck { name: String },
    #[error("invalid collection data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 组卡限制。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeckRules {
    pub max_deck_size: usize,
    pub max_copies: u32,
}

impl Default for DeckRules {
    fn default() -> Self {
        Self {
            max_deck_size: 30,
            max_copies: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collection {
    #[serde(default)]
    owned: BTreeMap<TemplateId, u32>,
    #[serde(default)]
    decks: BTreeMap<String, Vec<TemplateId>>,
    #[serde(default)]
    rules: DeckRules,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每张可收集卡牌各持有 `copies` 张的初始收藏。
    pub fn starter(catalog: &CardCatalog, copies: u32) -> Self {
        let mut collection = Self::new();
        for id in catalog.collectible() {
            collection.add_card(id, copies);
        }
        collection
    }

    pub fn from_json(json: &str) -> Result<Self, CollectionError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, CollectionError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn rules(&self) -> DeckRules {
        self.rules
    }

    pub fn add_card(&mut self, id: TemplateId, count: u32) {
        *self.owned.entry(id).or_insert(0) += count;
    }

    /// 持有数量不足时不做修改并返回 false。
    pub fn remove_card(&mut self, id: TemplateId, count: u32) -> bool {
        let Some(owned) = self.owned.get_mut(&id) else {
            return false;
        };
        if *owned < count {
            return false;
        }
        *owned -= count;
        if *owned == 0 {
            self.owned.remove(&id);
        }
        true
    }

    pub fn count(&self, id: TemplateId) -> u32 {
        self.owned.get(&id).copied().unwrap_or(0)
    }

    pub fn owned_cards(&self) -> impl Iterator<Item = (TemplateId, u32)> + '_ {
        self.owned.iter().map(|(id, count)| (*id, *count))
    }

    pub fn deck(&self, name: &str) -> Option<&[TemplateId]> {
        self.decks.get(name).map(Vec::as_slice)
    }

    pub fn deck_names(&self) -> impl Iterator<Item = &str> {
        self.decks.keys().map(String::as_str)
    }

    pub fn save_deck(
        &mut self,
        name: impl Into<String>,
        cards: Vec<TemplateId>,
        catalog: &CardCatalog,
    ) -> Result<(), CollectionError> {
        self.validate_deck(&cards, catalog)?;
        let name = name.into();
        debug!(deck = %name, size = cards.len(), "deck saved");
        self.decks.insert(name, cards);
        Ok(())
    }

    pub fn delete_deck(&mut self, name: &str) -> bool {
        self.decks.remove(name).is_some()
    }

    /// 把命名卡组解析为模板列表，顺序与保存时一致。
    pub fn resolve_deck(&self, name: &str, catalog: &CardCatalog) -> Result<Vec<Arc<CardTemplate>>, CollectionError> {
        let cards = self.decks.get(name).ok_or_else(|| CollectionError::UnknownDeck {
            name: name.to_owned(),
        })?;
        self.validate_deck(cards, catalog)?;
        cards
            .iter()
            .map(|id| catalog.get(*id).ok_or(CollectionError::UnknownCard { id: *id }))
            .collect()
    }

    pub fn validate_deck(&self, cards: &[TemplateId], catalog: &CardCatalog) -> Result<(), CollectionError> {
        if cards.is_empty() || cards.len() > self.rules.max_deck_size {
            return Err(CollectionError::InvalidDeckSize {
                size: cards.len(),
                max: self.rules.max_deck_size,
            });
        }
        let mut counts: BTreeMap<TemplateId, u32> = BTreeMap::new();
        for id in cards {
            if !catalog.contains(*id) {
                return Err(CollectionError::UnknownCard { id: *id });
            }
            *counts.entry(*id).or_insert(0) += 1;
        }
        for (id, count) in counts {
            if count > self.rules.max_copies {
                return Err(CollectionError::TooManyCopies {
                    id,
                    count,
                    max: self.rules.max_copies,
                });
            }
            let owned = self.count(id);
            if owned < count {
                return Err(CollectionError::NotEnoughCopies {
                    id,
                    owned,
                    required: count,
                });
            }
        }
        Ok(())
    }
}
