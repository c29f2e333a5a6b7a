pub mod clickhouse;
pub mod dialect_trait;

pub use clickhouse::*;
pub use dialect_trait::*;
