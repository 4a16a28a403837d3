#![recursion_limit = "256"]

#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate quick_error;
#[macro_use]
pub extern crate slog;
extern crate slog_stdlog;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// library modules
pub mod archive;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod facade;
pub mod log;
pub mod name;
pub mod ops;
pub mod property;
pub mod topology;
pub mod walk;

pub use crate::{dataset::{Dataset, DatasetKind, DatasetState},
                engine::Engine,
                error::{Error, ErrorKind, Result, ValidationError},
                log::GlobalLogger};
