//! Core engine modules for eventflow.

pub mod db;
pub mod error;
pub mod graph;
pub mod instantiate;
pub mod progression;
pub mod repo;
pub mod resolver;
pub mod service;
pub mod types;
pub mod workflow;
