pub mod commands;
pub mod device;

pub use commands::*;
pub use device::*;
