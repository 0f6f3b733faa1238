pub mod graph;
pub mod runner;

pub use graph::*;
pub use runner::*;
