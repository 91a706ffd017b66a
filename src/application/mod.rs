// Agent modules - fitness workers and strategy lifecycle
pub mod agents;
pub mod bootstrap;

// Distributed genetic optimization
pub mod optimization;

// System orchestrator
pub mod system;
