// Re-export types from submodules
pub use self::capabilities::*;
pub use self::framing::*;
pub use self::messages::*;
pub use self::types::*;

// Declare submodules
mod capabilities;
pub mod framing;
mod messages;
mod types;
