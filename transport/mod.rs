// Transport module: deadline-bounded communication with RCON servers
pub mod error;
pub mod traits;
pub mod tcp;

pub use error::*;
pub use traits::*;
pub use tcp::*;
