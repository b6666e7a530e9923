//! Authorization-code flow with PKCE.
//!
//! - `login` - the boundary to the external login subsystem
//! - `flow` - code issuance, single-use exchange, refresh grant, sessions
//!
//! The client-side half of PKCE (verifier generation and the redirect
//! state codec) lives in the `rp-auth` crate; the provider only ever sees
//! the challenge and, at exchange time, the verifier.

pub mod flow;
pub mod login;
