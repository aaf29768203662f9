//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Actor identity: reject early without caller headers
//! 2. Access log: runs after auth, has the actor

pub mod audit;
pub mod auth;
