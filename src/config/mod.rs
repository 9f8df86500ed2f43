mod config;

pub use config::{
    ChainSettings, FxSettings, IndexerSettings, JobSettings, PostgresSettings, Settings,
    WriterSettings,
};
