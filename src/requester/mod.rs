pub mod concurrent_limit;
pub mod requester_trait;

pub use concurrent_limit::*;
pub use requester_trait::*;
