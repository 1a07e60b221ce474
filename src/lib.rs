pub mod cache;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod diagram;
pub mod generator;
pub mod logging;
pub mod render;
pub mod server;
