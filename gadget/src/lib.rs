pub mod cli;
pub mod load_config;
pub mod tasks;

pub use cli::{run, Cli, Commands};
