//! Authentication configuration.

/// Configuration for credentials, session tokens and the kernel.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret. At least 32 bytes outside development.
    pub secret_key: String,
    /// Access token lifetime in seconds (default: 604_800 = 7 days).
    pub access_token_lifetime_secs: u64,
    /// Tolerance for tokens issued slightly in the future (default: 60).
    pub clock_skew_secs: u64,
    /// JWT issuer (`iss` claim).
    pub token_issuer: String,
    /// Argon2id memory cost in KiB.
    pub kdf_memory_kib: u32,
    /// Argon2id iteration count.
    pub kdf_iterations: u32,
    /// Argon2id lanes.
    pub kdf_parallelism: u32,
    /// Password reset token lifetime in seconds (default: 3600).
    pub password_reset_lifetime_secs: u64,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Minimum interval between two `last_access_at` writes for the same
    /// membership (default: 60).
    pub last_access_interval_secs: u64,
}

/// Minimum signing secret length accepted in production.
pub const MIN_SECRET_KEY_LEN: usize = 32;

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            access_token_lifetime_secs: 604_800,
            clock_skew_secs: 60,
            token_issuer: "clinic".into(),
            kdf_memory_kib: 19_456,
            kdf_iterations: 2,
            kdf_parallelism: 1,
            password_reset_lifetime_secs: 3600,
            min_password_length: 6,
            last_access_interval_secs: 60,
        }
    }
}
