//! Terminal plumbing shared by the commands.

pub mod logging;
pub mod progress;
