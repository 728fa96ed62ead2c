pub mod db;
pub mod qdrant;
pub mod schema;
pub mod units;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
