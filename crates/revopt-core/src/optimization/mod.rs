//! Reverse-communication protocol, line search and preconditioning.

pub mod line_search;
pub mod optimizer;
pub mod preconditioner;

// Re-export optimization components
pub use line_search::*;
pub use optimizer::*;
pub use preconditioner::*;
