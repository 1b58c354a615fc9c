//! Authentication settings and key material
//!
//! The handshake needs a fresh ephemeral key pair per connection attempt.
//! The key-exchange mathematics is supplied by the caller through
//! [`KeyGenerator`].

mod keys;
mod plugin;

pub use keys::{KeyGenerator, KeyPair};
pub use plugin::AuthPlugin;
pub(crate) use plugin::parse_bool;
