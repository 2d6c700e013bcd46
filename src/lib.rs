//! Job Tracker: reconciles job-application emails into a tracking table.

pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
pub mod tracker;
