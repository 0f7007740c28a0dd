//! Outbound delivery worker (§4.F): polls the outbound queue, ships
//! messages through an injected transport, applies retry/backoff.

pub mod transport;
pub mod worker;

pub use transport::{SendOutcome, Transport};
pub use worker::DeliveryWorker;
