pub mod console;
pub mod json;
