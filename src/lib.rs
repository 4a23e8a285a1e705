pub mod api;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod docstore;
pub mod error;
pub mod humanize;
pub mod jobs;
pub mod migration;
pub mod observability;
pub mod record;
pub mod storage;
pub mod transform;
