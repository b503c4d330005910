mod config;
mod rules;
mod sdf;
pub mod routes_file;
pub mod sessions_file;

pub use config::*;
pub use rules::*;
pub use sdf::*;
