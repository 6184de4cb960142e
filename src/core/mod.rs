//! Core translation logic — IR types, expressions, resolution, the translator contract.

pub mod config;
pub mod error;
pub mod expr;
pub mod fingerprint;
pub mod parser;
pub mod qualifier;
pub mod resolver;
pub mod translator;
pub mod types;
