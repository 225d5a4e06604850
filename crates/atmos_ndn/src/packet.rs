//! Interest and Data packets.

use crate::component::Component;
use crate::name::Name;
use crate::signing::Signature;
use std::time::Duration;

/// Default lifetime of an expressed Interest.
const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_secs(4);

/// A named request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    name: Name,
    can_be_prefix: bool,
    must_be_fresh: bool,
    lifetime: Duration,
}

impl Interest {
    /// Creates an Interest for an exact name.
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            lifetime: DEFAULT_INTEREST_LIFETIME,
        }
    }

    /// Allows any Data whose name starts with this Interest's name.
    #[must_use]
    pub fn with_can_be_prefix(mut self, value: bool) -> Self {
        self.can_be_prefix = value;
        self
    }

    /// Sets the MustBeFresh selector.
    #[must_use]
    pub fn with_must_be_fresh(mut self, value: bool) -> Self {
        self.must_be_fresh = value;
        self
    }

    /// Sets the Interest lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the CanBePrefix selector.
    pub fn can_be_prefix(&self) -> bool {
        self.can_be_prefix
    }

    /// Returns the MustBeFresh selector.
    pub fn must_be_fresh(&self) -> bool {
        self.must_be_fresh
    }

    /// Returns the lifetime.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Returns true if `data` satisfies this Interest.
    pub fn matches(&self, data: &Data) -> bool {
        if self.can_be_prefix {
            self.name.is_prefix_of(data.name())
        } else {
            self.name == *data.name()
        }
    }
}

/// Content type of a Data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Ordinary payload.
    Blob,
    /// Application-level negative acknowledgment.
    Nack,
}

impl ContentType {
    /// Returns the TLV code of the content type.
    pub fn code(&self) -> u8 {
        match self {
            ContentType::Blob => 0,
            ContentType::Nack => 3,
        }
    }
}

/// A named, signed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    name: Name,
    content: Vec<u8>,
    content_type: ContentType,
    freshness: Duration,
    final_block_id: Option<Component>,
    signature: Option<Signature>,
}

impl Data {
    /// Creates an empty unsigned Data packet.
    pub fn new(name: Name) -> Self {
        Self {
            name,
            content: Vec::new(),
            content_type: ContentType::Blob,
            freshness: Duration::ZERO,
            final_block_id: None,
            signature: None,
        }
    }

    /// Sets the content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Sets the freshness period.
    #[must_use]
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Sets the final block id.
    #[must_use]
    pub fn with_final_block_id(mut self, id: Component) -> Self {
        self.final_block_id = Some(id);
        self
    }

    /// Returns the name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Returns the content as UTF-8 text, ignoring one trailing NUL.
    ///
    /// Legacy publishers append a C string terminator to JSON payloads.
    pub fn content_str(&self) -> Option<&str> {
        let bytes = match self.content.split_last() {
            Some((0, rest)) => rest,
            _ => &self.content[..],
        };
        std::str::from_utf8(bytes).ok()
    }

    /// Returns the content type.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Returns the freshness period.
    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Returns the final block id.
    pub fn final_block_id(&self) -> Option<&Component> {
        self.final_block_id.as_ref()
    }

    /// Returns true if the last name component equals the final block id.
    pub fn is_final_block(&self) -> bool {
        match (&self.final_block_id, self.name.last()) {
            (Some(id), Some(last)) => id == last,
            _ => false,
        }
    }

    /// Returns the signature, if signed.
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Attaches a signature.
    pub fn set_signature(&mut self, signature: Signature) {
        self.signature = Some(signature);
    }

    /// Returns the bytes covered by a signature.
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.content.len() + 64);
        for component in self.name.components() {
            out.extend_from_slice(&(component.len() as u64).to_be_bytes());
            out.extend_from_slice(component.as_bytes());
        }
        out.push(self.content_type.code());
        out.extend_from_slice(&(self.freshness.as_millis() as u64).to_be_bytes());
        if let Some(id) = &self.final_block_id {
            out.extend_from_slice(id.as_bytes());
        }
        out.extend_from_slice(&self.content);
        out
    }

    /// Approximate encoded size, used for cache accounting.
    pub fn wire_size(&self) -> usize {
        let name_size: usize = self.name.components().iter().map(|c| c.len() + 2).sum();
        let signature_size = self.signature.as_ref().map_or(0, Signature::wire_size);
        name_size + self.content.len() + signature_size + 16
    }
}
