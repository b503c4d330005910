mod packets;
pub mod framework;

pub use packets::*;
