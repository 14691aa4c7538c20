//! Folding supervised output into a single result envelope.

mod aggregator;
mod result;
mod runner;

pub use aggregator::*;
pub use result::*;
pub use runner::*;
