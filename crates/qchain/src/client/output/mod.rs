pub mod cli;
pub mod json;
pub mod outputs;
