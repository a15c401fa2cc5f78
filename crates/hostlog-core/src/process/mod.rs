//! Process resource ranking.

mod aggregator;

pub use aggregator::{
    DEFAULT_TOP_K, ProcessAggregator, ProcessUsage, Rankings, RawUsage, fold_top_k,
};
