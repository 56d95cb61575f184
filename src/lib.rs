pub mod alerting;
pub mod api;
pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod events;
pub mod messaging;
pub mod notify;
pub mod security;
pub mod services;

#[cfg(test)]
pub mod testing;

pub use error::Error;
