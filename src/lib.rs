//! Library exports for the content-rewriting URL proxy
//!
//! This module exposes internal components for testing and potential library usage.

pub mod charset;
pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod fetcher;
pub mod handler;
pub mod model;
pub mod pipeline;
pub mod resolver;
pub mod rewrite;
pub mod route;
