//! Device service surface
//!
//! What the host framework sees: the [`Driver`] entry points and the
//! schemaless data carriers its callbacks are expressed in.

mod driver;
mod models;

pub use driver::*;
pub use models::*;
