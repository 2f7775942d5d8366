//! Order ingestion service: stream consumer, Postgres store and LRU read cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
