//! Request pipeline stages for a remote conversion call.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the facade in [`crate::client`] only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! options ──▶ payload ──▶ retry ──▶ transport ──▶ response
//!                          ▲            │
//!                          └─ classify ◀┘ (on failure)
//! ```
//!
//! 1. [`options`]   - keep only the options the server recognizes
//! 2. [`payload`]   - validate the input and build the JSON body
//! 3. [`retry`]     - attempt loop with exponential backoff
//! 4. [`transport`] - one HTTP round trip; the only stage with network I/O
//! 5. [`classify`]  - map failures to the error taxonomy + retry verdict
//! 6. [`response`]  - decode the success envelope

pub mod classify;
pub mod options;
pub mod payload;
pub mod response;
pub mod retry;
pub mod transport;
