#![forbid(unsafe_code)]

pub mod browser;
pub mod cli;
pub mod completion;
pub mod extraction;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod ollama;
pub mod pipeline;
pub mod reduce;
pub mod segment;
