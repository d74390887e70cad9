//! Nihemart checkout and payment gateway
//!
//! Storefront-side payment proxies in front of the Nihemart backend, the
//! KPay webhook relay, admin transaction reporting and the checkout
//! orchestration that ties order creation to payment sessions.

pub mod adapters;
pub mod api;
pub mod backend;
#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
