//! Client-side request pipeline for the Investi backend.
//!
//! [`ApiClient`] wraps every REST call with credential attachment, token
//! refresh, a timeout, a single retry on 401, response caching and an offline
//! queue. Typed endpoints live in [`api`].

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod queue;

pub use client::{ApiClient, Body, PipelineTasks, RequestOptions, RetryPolicy};
pub use config::Config;
pub use error::{ApiError, HttpError, Result};
