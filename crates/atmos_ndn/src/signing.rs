//! Signing contract.
//!
//! Key management lives outside the catalog. The catalog only chooses an
//! identity (the default one, or a configured signing name) and hands each
//! outgoing Data to a [`Signer`].

use crate::name::Name;
use crate::packet::Data;
use sha2::{Digest, Sha256};

/// Which identity signs outgoing Data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SigningIdentity {
    /// The signer's default identity.
    #[default]
    Default,
    /// A configured identity name.
    Named(Name),
}

impl SigningIdentity {
    /// Builds an identity from an optional configured name.
    pub fn from_option(name: Option<Name>) -> Self {
        match name {
            Some(name) if !name.is_empty() => SigningIdentity::Named(name),
            _ => SigningIdentity::Default,
        }
    }
}

/// Locates the key that verifies a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocator {
    /// No key locator (digest signatures).
    None,
    /// Key or identity name.
    Name(Name),
}

/// A signature attached to a Data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Key locator.
    pub key_locator: KeyLocator,
    /// Signature value.
    pub value: Vec<u8>,
}

impl Signature {
    /// Approximate encoded size.
    pub fn wire_size(&self) -> usize {
        let locator = match &self.key_locator {
            KeyLocator::None => 0,
            KeyLocator::Name(name) => name.components().iter().map(|c| c.len() + 2).sum(),
        };
        locator + self.value.len() + 4
    }
}

/// Signs outgoing Data.
pub trait Signer: Send + Sync {
    /// Signs `data` in place with `identity`.
    fn sign(&self, data: &mut Data, identity: &SigningIdentity);
}

/// Signs with a plain SHA-256 digest of the signed portion.
///
/// The identity, when named, is recorded as the key locator so receivers
/// can tell which catalog instance produced the packet.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestSha256Signer;

impl DigestSha256Signer {
    /// Creates a digest signer.
    pub fn new() -> Self {
        Self
    }

    /// Returns true if the signature matches the packet.
    pub fn verify(data: &Data) -> bool {
        match data.signature() {
            Some(sig) => sig.value == Sha256::digest(data.signed_portion()).to_vec(),
            None => false,
        }
    }
}

impl Signer for DigestSha256Signer {
    fn sign(&self, data: &mut Data, identity: &SigningIdentity) {
        let key_locator = match identity {
            SigningIdentity::Default => KeyLocator::None,
            SigningIdentity::Named(name) => KeyLocator::Name(name.clone()),
        };
        let value = Sha256::digest(data.signed_portion()).to_vec();
        data.set_signature(Signature { key_locator, value });
    }
}
