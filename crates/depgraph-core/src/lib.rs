pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod types;
pub mod usage;

pub use config::*;
pub use error::*;
pub use logging::init_tracing;
pub use node::*;
pub use types::*;
pub use usage::*;
