// src/lib.rs

//! Listing stream library
//!
//! Scrapes a classifieds results page, appends entries newer than a
//! persisted watermark to a capped append-only log, and reports the records
//! that are new since the previous run.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{AppError, Result};
