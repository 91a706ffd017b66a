// Wire envelope and routing keys
pub mod envelope;

// Request/reply body codecs
pub mod codec;

pub use envelope::{Envelope, Ontology, Performative, Route};
