pub mod config;
pub mod logging;
pub mod message;
pub mod store;
pub mod sync;
pub mod tasks;
pub mod transport;
