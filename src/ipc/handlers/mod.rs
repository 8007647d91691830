pub mod core;
pub mod exports;
pub mod records;
pub mod scores;
pub mod setup;
