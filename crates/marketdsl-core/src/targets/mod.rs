//! Target actors: one [`MarketDataWriter`](crate::MarketDataWriter) per sink.
//!
//! Writes are best effort per item. A batch either fails as a whole (not
//! ready, transport down, timeout) or resolves to a [`PublishResult`] with one
//! outcome per input item.
//!
//! [`PublishResult`]: crate::PublishResult

pub mod stream;
pub mod timeseries;

pub use stream::StreamWriter;
pub use timeseries::{DuckDbConnector, StoreConnector, TimeSeriesStore, TimeSeriesWriter};
