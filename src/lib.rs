//! Task-template dependency resolution and per-event workflow engine.

pub mod engine;
