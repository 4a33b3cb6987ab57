pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod feature;
pub mod fetch;
pub mod output;
pub mod parse;
pub mod sink;
pub mod store;
