//! Domain types: candles, identities, positions, trades, the probability boundary.

pub mod candle;
pub mod ids;
pub mod position;
pub mod probability;
pub mod trade;

pub use candle::{Candle, CandleSeries, SeriesError};
pub use ids::{ConfigHash, DatasetHash, RunId, WindowHash};
pub use position::{ExitThresholds, Position, Side};
pub use probability::{ConstantProvider, ProbabilityPair, ProbabilityProvider, SequenceProvider};
pub use trade::{ExitReason, TradeRecord};
