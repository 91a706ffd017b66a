pub mod cost_function;
pub mod genotype;
pub mod job;
pub mod strategy_model;

pub use genotype::{GeneBounds, Genotype, Population};
pub use job::{Job, WorkerDescriptor, WorkerId};
pub use strategy_model::{Decision, StrategyModel, TrainingState, normalize_symbol};
