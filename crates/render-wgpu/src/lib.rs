//! wgpu backend for the renderer core.
//!
//! Owns one uniform buffer per frame slot and reports GPU completion back to
//! the frame synchronizer from a dedicated poll thread.
//!
//! # Invariants
//! - A slot's uniform buffer is written only while the renderer holds that slot.
//! - Every successful submission signals its completion exactly once.
//! - The device and queue are created by the host; this crate only borrows them.

mod gpu;

pub use gpu::{WgpuQueue, WgpuQueueError};
