//! Fault-injectable service discovery registry for integration tests.
//!
//! Clients register, heartbeat, change status and look up instances over the
//! Eureka REST dialect. Trigger values embedded in instance fields make the
//! registry fail a configurable number of times before succeeding.

pub mod config;
pub mod server;
pub mod services;

pub use config::Config;
pub use server::{MockEurekaServer, ServerError};
