//! Application services: ingestion, warmup and the persistence seam.

pub mod error;
pub mod ingest;
pub mod repos;
pub mod warmup;
