#![deny(unsafe_code)]

//! Bounded job pools for the frame decode scheduler.
//!
//! This crate provides:
//! - [`JobPool`]: fixed set of reusable job slots with a FIFO of posted jobs
//! - [`Semaphore`]: the counting semaphore behind the free and filled slot counts

pub mod pool;
pub mod semaphore;

pub use pool::{EmptySlot, FullSlot, JobPool, SlotState};
pub use semaphore::Semaphore;
