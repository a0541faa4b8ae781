//! Chunk-wise rephrasing and plan-driven long-form generation on top of a text-completion
//! backend.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod plan;
pub mod progress;
pub mod quality;
pub mod segment;
pub mod terminology;
pub mod textutil;
pub mod tokenizer;
