//! A thin client for the Close REST API, plus the bulk operations built on it.

pub mod api;
pub mod commands;
pub mod csv_utils;
pub mod http;
pub mod pagination;

pub use api::{Api, DryRun};
pub use http::{ApiError, Client, ClientConfig};
