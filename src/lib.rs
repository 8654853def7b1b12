pub mod cache;
pub mod campaign;
pub mod config;
pub mod dashboard;
pub mod export;
pub mod loader;
pub mod model;
pub mod retell;
pub mod session;
pub mod stats;
pub mod view;
pub mod webhook;
