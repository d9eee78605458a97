//! # Model Families

pub mod senet;
