//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Auth validator: session token lookup, injects `ActorContext`
//! 2. Access logger: one trace line per request, after auth has the user id

pub mod audit;
pub mod auth;
