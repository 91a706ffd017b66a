use crate::domain::optimization::WorkerId;
use thiserror::Error;

/// Errors raised by the job manager's batch bookkeeping
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobManagerError {
    #[error("Cannot create jobs: batch {batch_id} still has outstanding jobs")]
    BatchInProgress { batch_id: u64 },

    #[error("No batch has been created")]
    NoBatch,

    #[error("Job {job_id} of batch {batch_id} is not part of the open batch")]
    UnknownJob { batch_id: u64, job_id: usize },

    #[error("Worker {worker_id} not found in job manager (was the job's worker_id modified?)")]
    UnknownWorker { worker_id: WorkerId },

    #[error("Job {job_id} was already reported done")]
    AlreadyCompleted { job_id: usize },

    #[error("Job {job_id} result has {actual} values, expected {expected}")]
    ResultLengthMismatch {
        job_id: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot create jobs from an empty population")]
    EmptyPopulation,

    #[error("Job manager has no workers")]
    NoWorkers,

    #[error("Batch {batch_id} aborted: {reason}")]
    BatchAborted { batch_id: u64, reason: String },
}

/// Errors decoding messages exchanged with workers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Malformed {what} payload: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("Unexpected performative {actual}, expected {expected}")]
    UnexpectedPerformative {
        expected: &'static str,
        actual: String,
    },

    #[error("Reply carries {actual} values for {expected} genotypes")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Worker reported failure: {reason}")]
    RemoteFailure { reason: String },
}

/// Terminal outcomes of a per-job conversation
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Job {job_id} exceeded {limit} worker reassignments")]
    ReassignmentLimitExceeded { job_id: usize, limit: usize },

    #[error(transparent)]
    Manager(#[from] JobManagerError),

    #[error("Transport failure: {reason}")]
    Transport { reason: String },
}

/// Errors surfaced by the genetic optimizer
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Generation {generation} dispatch failed: {source}")]
    Dispatch {
        generation: usize,
        #[source]
        source: JobManagerError,
    },

    #[error("Generation {generation} did not complete within {deadline_ms}ms")]
    DeadlineExceeded { generation: usize, deadline_ms: u64 },

    #[error("Population is empty")]
    EmptyPopulation,

    #[error("Received {actual} fitness values for {expected} genotypes")]
    FitnessCountMismatch { expected: usize, actual: usize },
}

/// Errors related to strategy training and decisions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("No trained model for {symbol}")]
    NotTrained { symbol: String },

    #[error("Training already in progress for {symbol}")]
    TrainingInProgress { symbol: String },

    #[error("Not enough prices for {symbol}: need {need}, got {got}")]
    InsufficientPrices {
        symbol: String,
        need: usize,
        got: usize,
    },
}
