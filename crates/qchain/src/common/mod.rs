pub mod arraydef;
pub mod cli;
pub mod config;
pub mod continuation;
pub mod env;
pub mod error;
pub mod machine;
pub mod parser;
pub mod placeholders;
pub mod setup;
pub mod utils;
