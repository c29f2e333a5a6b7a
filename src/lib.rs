pub mod algebra;
pub mod dialect;
pub mod external;
pub mod requester;
pub mod utils;

pub use algebra::*;
pub use dialect::*;
pub use external::*;
pub use requester::*;
pub use utils::*;
