//! Focusmaster Core - Shared functionality for focusmaster tools
//!
//! Everything that is not timer logic but is needed by more than one
//! surface: where data lives, whether the owner daemon is up, and how
//! durations are shown to a human.

pub mod daemon;
pub mod format;
pub mod paths;
pub mod process;

pub use paths::Paths;
