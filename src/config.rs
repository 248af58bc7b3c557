//! Auth configuration: TTLs, TOTP parameters, and rate-limit thresholds.

use secrecy::SecretString;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_ENROLLMENT_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_TOKEN_ISSUER: &str = "lexauth";
const DEFAULT_TOTP_ISSUER: &str = "Lexicon";
const DEFAULT_TOTP_SKEW: u8 = 1;
const DEFAULT_BACKUP_CODE_COUNT: usize = 10;
const DEFAULT_RATE_LIMIT_MAX_FAILURES: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_RATE_LIMIT_LOCKOUT_SECONDS: u64 = 60;
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_secret: SecretString,
    token_issuer: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    enrollment_ttl_seconds: i64,
    totp_issuer: String,
    totp_skew: u8,
    backup_code_count: usize,
    rate_limit_max_failures: u32,
    rate_limit_window_seconds: u64,
    rate_limit_lockout_seconds: u64,
    frontend_base_url: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self {
            token_secret,
            token_issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            enrollment_ttl_seconds: DEFAULT_ENROLLMENT_TTL_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
            totp_skew: DEFAULT_TOTP_SKEW,
            backup_code_count: DEFAULT_BACKUP_CODE_COUNT,
            rate_limit_max_failures: DEFAULT_RATE_LIMIT_MAX_FAILURES,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            rate_limit_lockout_seconds: DEFAULT_RATE_LIMIT_LOCKOUT_SECONDS,
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_token_issuer(mut self, issuer: String) -> Self {
        self.token_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_enrollment_ttl_seconds(mut self, seconds: i64) -> Self {
        self.enrollment_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_totp_skew(mut self, skew: u8) -> Self {
        self.totp_skew = skew;
        self
    }

    #[must_use]
    pub fn with_backup_code_count(mut self, count: usize) -> Self {
        self.backup_code_count = count;
        self
    }

    #[must_use]
    pub fn with_rate_limit_max_failures(mut self, max: u32) -> Self {
        self.rate_limit_max_failures = max;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window_seconds(mut self, seconds: u64) -> Self {
        self.rate_limit_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_lockout_seconds(mut self, seconds: u64) -> Self {
        self.rate_limit_lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    #[must_use]
    pub fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }

    #[must_use]
    pub fn token_issuer(&self) -> &str {
        &self.token_issuer
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn enrollment_ttl_seconds(&self) -> i64 {
        self.enrollment_ttl_seconds
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    #[must_use]
    pub fn totp_skew(&self) -> u8 {
        self.totp_skew
    }

    #[must_use]
    pub fn backup_code_count(&self) -> usize {
        self.backup_code_count
    }

    #[must_use]
    pub fn rate_limit_max_failures(&self) -> u32 {
        self.rate_limit_max_failures
    }

    #[must_use]
    pub fn rate_limit_window_seconds(&self) -> u64 {
        self.rate_limit_window_seconds
    }

    #[must_use]
    pub fn rate_limit_lockout_seconds(&self) -> u64 {
        self.rate_limit_lockout_seconds
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new(SecretString::from("test-secret"))
    }

    #[test]
    fn defaults_match_documented_windows() {
        let config = config();
        assert_eq!(config.access_ttl_seconds(), 15 * 60);
        assert_eq!(config.refresh_ttl_seconds(), 30 * 24 * 60 * 60);
        assert_eq!(config.enrollment_ttl_seconds(), 10 * 60);
        assert_eq!(config.totp_skew(), 1);
        assert_eq!(config.backup_code_count(), 10);
        assert_eq!(config.rate_limit_max_failures(), 5);
        assert_eq!(config.rate_limit_window_seconds(), 60);
    }

    #[test]
    fn builder_overrides() {
        let config = config()
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(120)
            .with_totp_issuer("Test".to_string())
            .with_backup_code_count(4)
            .with_rate_limit_max_failures(2)
            .with_frontend_base_url("https://app.test".to_string());
        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.refresh_ttl_seconds(), 120);
        assert_eq!(config.totp_issuer(), "Test");
        assert_eq!(config.backup_code_count(), 4);
        assert_eq!(config.rate_limit_max_failures(), 2);
        assert_eq!(config.frontend_base_url(), "https://app.test");
    }
}
