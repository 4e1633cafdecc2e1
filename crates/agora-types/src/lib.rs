//! Agora Types - Canonical domain types for data/compute asset escrow
//!
//! This crate contains all foundational types for Agora with zero dependencies
//! on other agora crates. It defines the type system shared by:
//!
//! - Identity types (Address, Bytes32) in ledger wire width
//! - Content-addressed asset identifiers (Did)
//! - Asset documents (Ddo, Service) and their reward schedules
//! - Conditions, agreements and their state machines
//! - The terminal result of an order (OrderResult)
//!
//! # Agreement Flow
//!
//! ```text
//! Created → LockInitiated → LockConfirmed → ServicePending → ServiceFulfilled → RewardReleased
//!                 ↘                ↘                  ↘
//!               Aborted          Aborted            Refunded
//! ```

pub mod identity;
pub mod did;
pub mod condition;
pub mod agreement;
pub mod ddo;
pub mod order;
pub mod contracts;
pub mod error;

pub use identity::*;
pub use did::*;
pub use condition::*;
pub use agreement::*;
pub use ddo::*;
pub use order::*;
pub use contracts::*;
pub use error::*;

pub use alloy_primitives::U256;
