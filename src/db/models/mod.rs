mod alert;
mod candle;
mod checkpoint;
mod fx;
mod holder;
mod matrix;
mod pool;
mod pool_state;
mod price;
mod token;
mod trade;

pub use alert::AlertParams;
pub use candle::{Candle1m, CandleTick};
pub use checkpoint::IndexState;
pub use fx::FxRate;
pub use holder::HolderPage;
pub use matrix::{Bucket, PoolMatrixRow, TokenMatrixRow, BUCKETS};
pub use pool::{PairType, Pool};
pub use pool_state::PoolStateUpdate;
pub use price::PriceUpdate;
pub use token::{Token, TokenKind};
pub use trade::{Trade, TradeAction, TradeDirection};
