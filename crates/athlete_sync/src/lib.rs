//! Firstbeat → Smartabase sync: fetch ACWR/RMSSD measurements, stage them as
//! CSV, match athletes to platform users, drop what was already uploaded and
//! insert the rest as form events.

pub mod commands;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod ledger;
pub mod lock;
pub mod pipeline;
pub mod roster;
pub mod staging;
pub mod transform;
pub mod upload;

mod test_utils;

pub use error::{SyncError, SyncResult};
pub use pipeline::{Outcome, Pipeline, PipelineSettings};
