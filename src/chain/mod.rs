mod client;

pub use client::{ChainClient, HttpStatusError};
