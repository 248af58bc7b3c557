//! # Lexauth (Lexicon identity and access core)
//!
//! `lexauth` is the trust boundary of the Lexicon personal OS backend. Every
//! other module (tasks, notes, files, ...) consumes it through two calls:
//! `authenticate(bearer) -> AuthContext` and `authorize(ctx, resource, action)`.
//!
//! ## Credentials
//!
//! Logins produce a credential pair: a short-lived signed access token carrying
//! subject, session id and generation, plus a long-lived opaque refresh token.
//! Refresh tokens are single use; the database only ever stores their hash. Each
//! refresh advances a per-session generation counter with a compare-and-swap, so
//! presenting a stale token is detected as replay and revokes the whole session.
//!
//! ## Sessions & MFA
//!
//! One session per logged-in device, the unit of revocation. TOTP enrollment is
//! a short-TTL pending record promoted only after the first correct code;
//! enabling, disabling, or changing a password revokes every other session.
//!
//! ## Authorization
//!
//! Permission resolution is a pure function of the identity's roles plus
//! per-identity overrides. Unknown (resource, action) pairs deny.

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod mfa;
pub mod permission;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod store;
pub mod token;
