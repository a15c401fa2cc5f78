//! Mock implementations of the filesystem and command seams.

mod commands;
mod filesystem;
mod scenarios;

pub use commands::MockCommands;
pub use filesystem::MockFs;
