pub mod app;
pub mod config;
pub mod crossref;
pub mod domain;
pub mod error;
pub mod output;
pub mod sources;
pub mod tui;
pub mod writer;
