pub mod analytics;
pub mod cli;
pub mod export;
pub mod load_config;
pub mod logging;
pub mod platform;
pub mod sru;
pub mod xml;

pub use cli::{run, Cli, Commands};
