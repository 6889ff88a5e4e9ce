//! # gitdex HTTP
//!
//! HTTP client abstraction shared by the search backend and the
//! read-only storage mirror.
//!
//! This crate provides:
//! - [`HttpClient`], a blocking request/response trait to implement on top
//!   of any HTTP library
//! - [`LoopbackClient`] / [`LoopbackServer`] for tests without a network
//! - URL quoting helpers

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod url;

pub use client::{HttpClient, HttpRequest, HttpResponse, LoopbackClient, LoopbackServer, Method};
pub use error::{HttpError, HttpResult};
pub use url::{encode_query, quote};
