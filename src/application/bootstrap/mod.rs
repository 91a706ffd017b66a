pub mod workers;

pub use workers::WorkersBootstrap;
