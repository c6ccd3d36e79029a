pub mod archive;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod ensemble;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod output;
pub mod store;
pub mod toolkit;
