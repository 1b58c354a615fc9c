//! Ephemeral key pair and its generator

use std::fmt;

/// Ephemeral public/secret values, big-endian unsigned integers
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Client public value, sent during `op_connect`
    pub public: Vec<u8>,
    /// Client secret value, used to compute the proof during accept
    pub secret: Vec<u8>,
}

impl KeyPair {
    /// Create from raw big-endian values
    pub fn new(public: Vec<u8>, secret: Vec<u8>) -> Self {
        Self { public, secret }
    }
}

// Never print the secret value
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_len", &self.public.len())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Produces one ephemeral key pair per connection attempt
pub trait KeyGenerator: Send + Sync {
    /// Generate a fresh pair
    fn generate(&self) -> KeyPair;
}

impl<F> KeyGenerator for F
where
    F: Fn() -> KeyPair + Send + Sync,
{
    fn generate(&self) -> KeyPair {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let pair = KeyPair::new(vec![1, 2, 3], vec![0xde, 0xad]);
        let text = format!("{:?}", pair);
        assert!(text.contains("redacted"));
        assert!(!text.contains("222"));
        assert!(text.contains("public_len: 3"));
    }

    #[test]
    fn test_closure_is_a_generator() {
        let gen = || KeyPair::new(vec![7], vec![9]);
        let pair = KeyGenerator::generate(&gen);
        assert_eq!(pair.public, vec![7]);
        assert_eq!(pair.secret, vec![9]);
    }
}
