//! Internal pub/sub over Postgres NOTIFY.
//!
//! The block processor publishes pair creations here; the fast-track
//! listener consumes them on a dedicated LISTEN connection.

mod notify;

pub use notify::{Notifier, PairCreated, PAIR_CREATED_CHANNEL};
