//! Edge telemetry gateway library.
//!
//! Ingests device telemetry via a websocket adapter and fans each message
//! out to one or more configured message brokers through a bounded,
//! cancellation-aware dispatch pipeline.

pub mod auth;
pub mod broker;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ingress;
pub mod message;
pub mod workerpool;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use message::Message;
