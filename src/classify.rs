//! Method-name classification of inbound calls.
//!
//! Classification is a total function and fails open: anything that is not
//! on the intercept allow-list - including calls with a missing or
//! non-string `method` - passes through to the upstream, preserving proxy
//! availability for traffic we do not audit.

/// Transaction-submission methods that are intercepted instead of forwarded.
///
/// This slice is the single point of policy control; extending interception
/// to another method is a one-line change here.
pub const INTERCEPT_METHODS: &[&str] = &[
    "eth_sendRawTransaction",
    "eth_sendTransaction",
    "eth_sendRawTransaction_reserve",
    "eth_sendTransaction_reserve",
];

/// Routing decision for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Transaction submission - audit locally, do not forward.
    Intercept,
    /// Everything else - forward to the upstream verbatim.
    Passthrough,
}

/// Classifies a call by its method name.
pub fn classify(method: Option<&str>) -> CallKind {
    match method {
        Some(m) if INTERCEPT_METHODS.contains(&m) => CallKind::Intercept,
        _ => CallKind::Passthrough,
    }
}
