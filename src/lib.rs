//! Ascend NPU runtime pieces for vLLM-style inference.
//!
//! Re-exports the core crate's modules:
//! - [`distributed`] - MC2 and node-local MLP TP group lifecycle
//! - [`torchair`] - torchair cache-directory management

pub use vllm_ascend_core::{distributed, torchair};
