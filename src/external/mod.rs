pub mod attribute;
pub mod clickhouse_external;
pub mod external_trait;

pub use attribute::*;
pub use clickhouse_external::*;
pub use external_trait::*;
