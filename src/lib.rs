pub mod access;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod locks;
pub mod money;
pub mod offer;
pub mod order;
pub mod repository;
pub mod service;
pub mod settings;
pub mod state_machine;
pub mod telemetry;
pub mod types;
pub mod utils;
