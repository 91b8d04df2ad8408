//! Hardware abstraction and safety monitoring for the strider robot.
//!
//! The robot has two physically separate motor boards (front and
//! rear), each reached through a [`BoardLink`]. This crate owns
//! everything between those links and the observation builder:
//!
//! - [`telemetry`] – line-oriented text-protocol parsing for motor
//!   telemetry and board status.
//! - [`joints`] – the joint table, safety margins, and the named
//!   index translations between joint space, motor ids, and action
//!   channels.
//! - [`health`] – debounced connection-health tracking.
//! - [`envelope`] – the joint position/velocity safety envelope.
//! - [`monitor`] – [`SafetyMonitor`], the per-tick owner that parses,
//!   validates, dispatches, and e-stops.
//! - [`sim`] – scripted in-process boards for headless testing.

pub mod envelope;
pub mod health;
pub mod joints;
pub mod link;
pub mod monitor;
pub mod sim;
pub mod telemetry;

pub use health::ConnectionHealth;
pub use link::BoardLink;
pub use monitor::{HalError, SafetyMonitor};
pub use sim::SimBoard;
