//! Model optimization stage.

mod dpo;

pub use dpo::*;
