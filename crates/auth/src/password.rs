use crate::error::Result;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use uuid::Uuid;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 1,
            parallelism: 4,
            output_len: 32,
        }
    }
}

/// Deterministic per-user Argon2id hashing.
///
/// The user's id is the salt, so hashing the same password for the same user
/// always yields the same string. Output is raw base64 without padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHasher {
    params: HashParams,
}

impl PasswordHasher {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    pub fn hash(&self, password: &str, user_id: Uuid) -> Result<String> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            Some(self.params.output_len),
        )?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut output = vec![0u8; self.params.output_len];
        argon2.hash_password_into(password.as_bytes(), user_id.as_bytes(), &mut output)?;

        Ok(STANDARD_NO_PAD.encode(output))
    }

    /// Recompute and compare in constant time.
    pub fn verify(&self, password: &str, user_id: Uuid, stored: &str) -> Result<bool> {
        let candidate = self.hash(password, user_id)?;
        Ok(constant_time_eq::constant_time_eq(
            candidate.as_bytes(),
            stored.as_bytes(),
        ))
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_blocking(&self, password: &str, user_id: Uuid) -> Result<String> {
        let hasher = *self;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password, user_id)).await?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    pub async fn verify_blocking(&self, password: &str, user_id: Uuid, stored: &str) -> Result<bool> {
        let hasher = *self;
        let password = password.to_string();
        let stored = stored.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, user_id, &stored)).await?
    }
}

/// Constant-time string equality for tokens and hashes.
pub fn secure_eq(a: &str, b: &str) -> bool {
    constant_time_eq::constant_time_eq(a.as_bytes(), b.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::new(HashParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        })
    }

    #[test]
    fn test_hash_is_deterministic_per_user() {
        let hasher = cheap();
        let user = Uuid::new_v4();

        let first = hasher.hash("correct horse", user).unwrap();
        let second = hasher.hash("correct horse", user).unwrap();
        let other_user = hasher.hash("correct horse", Uuid::new_v4()).unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other_user);
        assert!(!first.ends_with('='));
        // 32 bytes encode to 43 unpadded base64 characters
        assert_eq!(first.len(), 43);
    }

    #[test]
    fn test_verify() {
        let hasher = cheap();
        let user = Uuid::new_v4();
        let stored = hasher.hash("s3cret-pass", user).unwrap();

        assert!(hasher.verify("s3cret-pass", user, &stored).unwrap());
        assert!(!hasher.verify("wrong-pass", user, &stored).unwrap());
    }

    #[test]
    fn test_default_params() {
        let params = HashParams::default();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.iterations, 1);
        assert_eq!(params.parallelism, 4);
        assert_eq!(params.output_len, 32);
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hasher = cheap();
        let user = Uuid::new_v4();
        let stored = hasher.hash_blocking("pass-word", user).await.unwrap();
        assert!(hasher.verify_blocking("pass-word", user, &stored).await.unwrap());
    }
}
