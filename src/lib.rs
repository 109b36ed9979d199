#![forbid(unsafe_code)]

pub mod annotate;
pub mod cli;
pub mod config;
pub mod content;
pub mod document;
pub mod formats;
pub mod keywords;
pub mod logging;
pub mod output;
pub mod stats;
pub mod suggest;
