//! Numerical building blocks shared by the engines.

pub mod linalg;
pub mod numerical_diff;

pub use linalg::*;
pub use numerical_diff::*;
