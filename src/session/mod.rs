//! Sessions are the unit of revocation: each login creates one, and every
//! refresh token chain hangs off exactly one session.

pub mod registry;

pub use registry::SessionRegistry;
