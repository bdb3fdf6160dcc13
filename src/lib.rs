pub mod api;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod services;
pub mod store;
pub mod utils;
