// src/lib.rs — Library root for dockersmith

pub mod analyzer;
pub mod cli;
pub mod core;
pub mod executor;
pub mod infra;
pub mod provider;
pub mod util;
