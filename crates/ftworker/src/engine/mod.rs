pub mod driver;
pub mod piskvork;
pub mod uci;

pub use driver::{EngineConfig, EngineDriver, EngineReply, Protocol};
