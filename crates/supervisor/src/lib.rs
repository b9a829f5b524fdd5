pub mod client;
pub mod pool;
pub mod routes;
pub mod worker;

pub use client::DistributorClient;
pub use pool::AnalyzerPool;
pub use routes::{build_router, AppState};
