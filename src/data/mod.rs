pub mod basis;
pub mod ingestion;
pub mod kline;
pub mod processing;
pub mod series;

pub use ingestion::DataIngestion;
pub use processing::{merge, DerivedRow};
