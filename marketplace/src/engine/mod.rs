//! Metrics engine: pure functions over entity fields.
//!
//! Nothing here touches the store or fails; zero denominators resolve to documented
//! defaults.

pub mod popularity;
pub mod segment;

pub use popularity::{
    ProductPerformance, average_sale_price, conversion_rate, popularity, popularity_score,
    rank_popular,
};
pub use segment::segment_for;
