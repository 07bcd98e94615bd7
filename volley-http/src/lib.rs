//! Pooled HTTP/1.1 client shared by the http, graphql and soap executors.

#![forbid(unsafe_code)]

mod client;
mod error;
mod size;
mod types;

pub use client::HttpClient;
pub use error::{Error, HttpTransportErrorKind, Result};
pub use types::{HttpRequest, HttpResponse};
