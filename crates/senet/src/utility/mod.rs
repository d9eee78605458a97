//! # Utilities

pub mod probability;
pub mod record;
pub mod shapes;
