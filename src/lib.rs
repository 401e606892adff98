#[macro_use]
pub mod errors;
pub mod console;
pub mod loader;
pub mod storage;
