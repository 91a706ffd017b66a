// Distributed fitness evaluation: batches, conversations and the GA loop
pub mod conversation;
pub mod job_manager;
pub mod optimizer;

pub use conversation::{Conversation, ConversationConfig};
pub use job_manager::{JobManager, SharedJobManager};
pub use optimizer::{GeneticOptimizer, OptimizationOutcome, OptimizerConfig};
