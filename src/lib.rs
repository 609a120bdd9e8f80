//! Personal time tracking on top of plain markdown agenda tables.
//! Every device writes its own table per date, and kairos merges them into a single view without
//! any server, database or locking between devices.

pub mod cli;
pub mod config;
pub mod ledger;
pub mod planner;
pub mod utils;
