//! # NovaPay gateway server
//! This module hosts the HTTP surface of the NovaPay payment gateway. It is responsible for:
//! Listening for incoming callback requests from the NovaPay platform.
//! Handing the raw request body to the callback engine for verification and order state application.
//! Returning the plain-text acknowledgment the platform's retry logic keys on.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/novapay/callback`: The webhook route for receiving payment outcome callbacks from NovaPay.

pub mod cli;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
