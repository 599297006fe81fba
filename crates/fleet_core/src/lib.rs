//! # Fleet Control Kernel
//!
//! The control core for fleets of automated guided vehicles.
//!
//! ## Overview
//!
//! This crate provides the kernel of a fleet control system, including:
//!
//! - **Object Pool**: Typed, identity-preserving storage for every model
//!   entity, with structural event emission
//! - **Model Facade**: Cross-entity invariants, link maintenance and cascade
//!   deletion over the pool
//! - **Routing Engine**: Per-vehicle shortest-path tables with pluggable cost
//!   functions and multi-stop route composition
//! - **Order Lifecycle**: Transport-order and order-sequence state machines,
//!   dependencies, dispatch and withdrawal
//! - **Kernel Supervisor**: The three-mode state machine gating every
//!   operation, plus users, configuration and model persistence
//!
//! ## Key Concepts
//!
//! - **Handles, not pointers**: Entities reference each other by typed
//!   (id, name) handles resolved through the pool on each use
//! - **Events carry snapshots**: Every committed mutation publishes the full
//!   before/after state of the object
//! - **Frozen routing inputs**: Tables are computed from a snapshot of the
//!   model and invalidated wholesale on topology changes
//! - **Synchronous contract**: The public surface is synchronous; one global
//!   writer lock serializes all mutations
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleet_core::config::KernelConfig;
//! use fleet_core::kernel::{Kernel, KernelState};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let a = kernel.create_point().unwrap();
//! let b = kernel.create_point().unwrap();
//! let path = kernel.create_path(&a, &b).unwrap();
//! kernel.set_path_length(&path, 2_000).unwrap();
//! kernel.set_state(KernelState::Operating).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod kernel;
pub mod model;
pub mod orders;
pub mod persistence;
pub mod pool;
pub mod refs;
pub mod routing;
pub mod users;

#[cfg(test)]
pub mod test_helpers;

pub use error::{KernelError, Result};
