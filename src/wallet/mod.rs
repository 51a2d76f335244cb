pub mod coordinator;
pub mod services;
pub mod types;
pub mod vault;

pub use coordinator::*;
pub use types::*;
