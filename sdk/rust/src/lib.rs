//! Client for the request proxy service.

mod client;

pub use client::*;
