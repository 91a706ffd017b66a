use super::genotype::Genotype;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical form of a symbol: trimmed and upper-cased, matching `{SYMBOL}.csv`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Learned window pair for a symbol, as persisted by the model store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyModel {
    pub symbol: String,
    pub short_window: u32,
    pub long_window: u32,
    pub fitness: f64,
    pub trained_at: DateTime<Utc>,
}

impl StrategyModel {
    pub fn new(symbol: impl AsRef<str>, genotype: Genotype, fitness: f64) -> Self {
        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            short_window: genotype.short_window,
            long_window: genotype.long_window,
            fitness,
            trained_at: Utc::now(),
        }
    }

    pub fn genotype(&self) -> Genotype {
        Genotype::new(self.short_window, self.long_window)
    }
}

/// Answer served by a trained strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Buy,
    Hold,
}

impl Decision {
    /// Wire answer carried in a decision reply.
    pub fn answer(&self) -> &'static str {
        match self {
            Decision::Buy => "yes",
            Decision::Hold => "no",
        }
    }

    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer {
            "yes" => Some(Decision::Buy),
            "no" => Some(Decision::Hold),
            _ => None,
        }
    }
}

/// Training lifecycle of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TrainingState {
    Untrained,
    Training,
    Trained(StrategyModel),
    Failed(String),
}

impl TrainingState {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainingState::Trained(_))
    }
}
