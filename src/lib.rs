//! Choice Operator - intercepting reverse proxy for blockchain JSON-RPC traffic.
//!
//! The proxy sits in front of a single upstream JSON-RPC provider. Every
//! inbound call is buffered, parsed, and classified by method name:
//!
//! - **Intercept:** transaction-submission calls (`eth_sendRawTransaction`
//!   and friends) are fingerprinted by their `params`, written once into an
//!   audit store, and answered with a synthesized JSON-RPC success envelope.
//!   Resubmissions of the same params are idempotent - one audit record,
//!   identical responses.
//! - **Passthrough:** everything else is forwarded to the upstream with the
//!   original body bytes and the upstream response is relayed verbatim.
//!
//! Classification is fail-open (unknown methods pass through) while auditing
//! is fail-closed: an intercepted call that cannot be fingerprinted or
//! recorded is rejected, never silently forwarded.

pub mod audit;
pub mod classify;
pub mod error;
pub mod fingerprint;
pub mod forward;
pub mod jsonrpc;
pub mod router;
