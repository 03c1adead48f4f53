pub mod build_info;
pub mod cli;
pub mod cloud_client;
pub mod collector;
pub mod config;
pub mod inventory;
pub mod logging;
pub mod normalizer;
pub mod registry;
pub mod server;
pub mod sink;
pub mod state;
