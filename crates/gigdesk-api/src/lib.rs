//! REST client for the marketplace backend: chat history and messages,
//! orders, invoices, payments and reviews.

pub mod client;
pub mod config;
pub mod error;
pub mod http;

pub use client::{ChatApi, MarketApi, OrderApi};
pub use config::ApiConfig;
pub use error::ApiError;
pub use http::HttpClient;
