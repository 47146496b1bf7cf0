pub mod batch;
pub mod env;
