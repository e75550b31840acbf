// Data models (structs)
pub mod asset;
pub mod job;

pub use asset::*;
pub use job::*;
