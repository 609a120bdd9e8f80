//! The file-backed ledger. The basic idea is:
//!  - Every date has an agenda table per device (a replica) in a single folder.
//!  - Replicas are merged into a [unified::UnifiedLedger] on every read, the primary file last.
//!  - Every change is also appended to an audit file that is never rewritten.

pub mod audit;
pub mod consumption;
pub mod ids;
pub mod replicas;
pub mod row;
pub mod store;
pub mod tags;
pub mod unified;
