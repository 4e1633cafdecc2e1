//! Agora Escrow - Agreement orchestration
//!
//! The orchestrator turns "consumer X wants service N of asset D" into a
//! ledger agreement and drives it through lock, delivery and release:
//!
//! - [`OrderPlan`]: document + service + consumer to ordered conditions
//! - [`OrderSaga`]: one in-flight agreement and its subscriptions
//! - [`AgreementOrchestrator`]: the step operations and the full flow
//! - [`SimulatedProvider`]: the publisher side, for tests and the demo
//!
//! # Invariants
//!
//! 1. Consumer and provider derive byte-identical condition IDs
//! 2. The lock is fulfilled before the service, the service before the reward
//! 3. Rejections are never retried; transport errors are, within bounds
//! 4. A saga's listeners are released when it finishes or is dropped

pub mod error;
pub mod config;
pub mod retry;
pub mod plan;
pub mod saga;
pub mod orchestrator;
pub mod provider;

pub use error::*;
pub use config::*;
pub use retry::*;
pub use plan::*;
pub use saga::*;
pub use orchestrator::*;
pub use provider::*;
