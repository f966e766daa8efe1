pub mod api;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod fetcher;
pub mod history;
pub mod humanize;
pub mod job;
pub mod observability;
pub mod registry;
pub mod strategy;
