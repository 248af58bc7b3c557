//! Second factor: RFC 6238 TOTP plus single-use backup codes.

pub mod backup;
pub mod crypto;
pub mod service;

pub use backup::BackupCodeBatch;
pub use service::{EnrollmentStart, MfaService, MfaVerification};
