// Messaging envelope and codecs
pub mod messaging;

// Optimization domain
pub mod optimization;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
