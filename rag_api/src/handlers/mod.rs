pub mod health;
pub mod query;
pub mod stats;

pub use health::health_check;
pub use query::rag_query;
pub use stats::get_stats;
