pub mod backend;
pub mod classify;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod handler;
pub mod health;
pub mod logging;
pub mod macro_engine;
pub mod masking;
pub mod materialize;
pub mod output;
