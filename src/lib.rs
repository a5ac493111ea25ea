pub mod commands;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod docs;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod utils;

pub use dispatcher::Dispatcher;
pub use events::{Bus, EventBus, Message};
pub use registry::Registry;
