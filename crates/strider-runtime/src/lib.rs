//! Mode registry, observation builder, and control-rate pacing for
//! the strider control core.
//!
//! A [`Mode`](mode::Mode) binds a validated configuration to a loaded
//! policy. The [`RlRuntime`](rl::RlRuntime) keeps the registered
//! modes, the rolling temporally-stacked state buffer, and the
//! last-action memory, and turns one tick's sensor payload into a
//! policy action. [`ControlRate`](rate::ControlRate) paces the host
//! loop at a fixed frequency.

pub mod mode;
pub mod rate;
pub mod rl;

pub use mode::{Mode, ModeConfig};
pub use rate::{ControlRate, InvalidRate};
pub use rl::{RlError, RlRuntime};
