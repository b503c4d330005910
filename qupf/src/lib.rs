//! qupf - a UPF user plane that runs GTP-U sessions over raw Ethernet interfaces

pub mod data;
mod upf;
pub mod userplane;

pub use data::Config;
pub use upf::Upf;
pub use userplane::{Action, Pipeline, Sessions, StaticRoutes};
