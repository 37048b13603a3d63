pub mod config;
pub mod downstream;
