//! # Module / Weight Caches
//!
//! * [`disk`] - the on-disk cache policy and read-through downloads.
//! * [`weights`] - pretrained weights descriptors and directories.
//! * [`prefabs`] - named, well-known model configs.

pub mod disk;
pub mod prefabs;
pub mod weights;
