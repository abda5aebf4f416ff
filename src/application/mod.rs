//! Application layer: pricing a charge and driving payment attempts.
//!
//! `PaymentOrchestrator` is the entry point. It prices a selection with the
//! amount calculator and hands back an `AttemptHandle`, whose state machine is
//! driven by `initiate` and races the poll loop, user cancellation and the
//! deadline under a `tokio::select!`. The `SessionGuard` keeps at most one
//! attempt in flight per order.

pub mod calculator;
pub mod guard;
pub mod orchestrator;
pub mod poll;
