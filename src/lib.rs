pub mod chain;
pub mod config;
pub mod cron;
pub mod db;
pub mod pubsub;
pub mod utils;
pub mod worker;
pub mod writers;

pub use chain::ChainClient;
pub use config::Settings;
pub use cron::CronScheduler;
pub use db::PostgresClient;
pub use worker::{BlockDriver, BlockProcessor, FastTrackListener, HoldersSweeper, MetadataResolver};
pub use writers::Writers;
