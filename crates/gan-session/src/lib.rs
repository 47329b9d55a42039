//! Session Store (§4.E): durable per-session record of iterations, atomic writes,
//! periodic reaping of stale records.

mod store;

pub use store::{ContextOp, SessionStore};
