pub mod api_client;
pub mod configuration;
pub mod console;
pub mod error;
pub mod guard;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod validators;
