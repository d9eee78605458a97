//! # Layer wrappers over ``burn::nn``.

pub mod activation_wrapper;
pub mod normalization_wrapper;
