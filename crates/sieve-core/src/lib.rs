//! # sieve-core
//!
//! Core types, traits, and normalization for the invoice anomaly sieve.
//!
//! This crate provides the foundational data structures, the error type,
//! the deterministic normalizer, and the trait seams that the other sieve
//! crates depend on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod traits;

pub use config::Settings;
pub use error::{Error, Result};
pub use models::*;
pub use normalize::{
    desc_norm, hash_account, invoice_number_norm, mask_account_last4, payload_hash, text_blob,
    NORMALIZER_VERSION,
};
pub use traits::{DuplicateScorer, TextIndex};
