// Agents serving the message bus: fitness workers and per-symbol strategies
pub mod strategy_agent;
pub mod worker;
