//! Safety and cleanup
//!
//! Scratch directories owned by exactly one evaluation and removed on every
//! exit path.

pub mod workspace;

pub use workspace::ScratchDir;
