pub mod fs;
pub mod str;
