//! Command implementations for the pagesync CLI.

mod check;
mod sync;

pub use check::execute as check_database;
pub use sync::execute as run_sync;
