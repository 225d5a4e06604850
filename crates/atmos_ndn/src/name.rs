//! Hierarchical names.

use crate::component::Component;
use crate::error::{NameError, NameResult};
use std::fmt;
use std::str::FromStr;

/// An ordered sequence of [`Component`]s.
///
/// Names identify both requests and content. They are compared
/// component-wise in canonical order, so every name sharing a prefix
/// occupies a contiguous range of an ordered map.
///
/// # Example
///
/// ```rust
/// use atmos_ndn::Name;
///
/// let name: Name = "/catalog/query-results".parse().unwrap();
/// let seg = name.clone().append_segment(0);
/// assert!(name.is_prefix_of(&seg));
/// assert_eq!(seg.to_uri(), "/catalog/query-results/%00%00");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// Creates the empty (root) name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a name from components.
    pub fn from_components(components: Vec<Component>) -> Self {
        Self { components }
    }

    /// Parses a name from its URI form (`/a/b`, `ndn:/a/b`).
    pub fn from_uri(uri: &str) -> NameResult<Self> {
        let path = match uri.split_once(':') {
            Some((scheme, rest)) if !scheme.contains('/') => {
                if scheme != "ndn" {
                    return Err(NameError::UnsupportedScheme(uri.to_string()));
                }
                rest
            }
            _ => uri,
        };
        let path = path.trim_start_matches('/');

        let mut components = Vec::new();
        for text in path.split('/') {
            if text.is_empty() {
                continue;
            }
            components.push(Component::from_uri(text)?);
        }
        Ok(Self { components })
    }

    /// Returns the number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true for the root name.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the component at `index`.
    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    /// Returns the component at `index`, or an error if out of range.
    pub fn at(&self, index: usize) -> NameResult<&Component> {
        self.components.get(index).ok_or(NameError::OutOfRange {
            index,
            len: self.components.len(),
        })
    }

    /// Returns the last component.
    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }

    /// Returns the components.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Appends a component.
    #[must_use]
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Appends every component of another name.
    #[must_use]
    pub fn append_name(mut self, other: &Name) -> Self {
        self.components.extend(other.components.iter().cloned());
        self
    }

    /// Appends a segment-number component.
    #[must_use]
    pub fn append_segment(self, segment_no: u64) -> Self {
        self.append(Component::segment(segment_no))
    }

    /// Appends a version component.
    #[must_use]
    pub fn append_version(self, version: u64) -> Self {
        self.append(Component::version(version))
    }

    /// Returns the first `count` components as a new name.
    ///
    /// `count` larger than the name yields the whole name.
    pub fn prefix(&self, count: usize) -> Name {
        let end = count.min(self.components.len());
        Self {
            components: self.components[..end].to_vec(),
        }
    }

    /// Returns the name without its last component.
    ///
    /// The root name is its own parent.
    pub fn parent(&self) -> Name {
        self.prefix(self.components.len().saturating_sub(1))
    }

    /// Returns up to `count` components starting at `start`.
    pub fn sub_name(&self, start: usize, count: usize) -> Name {
        let start = start.min(self.components.len());
        let end = start.saturating_add(count).min(self.components.len());
        Self {
            components: self.components[start..end].to_vec(),
        }
    }

    /// Returns every component from `start` to the end.
    pub fn suffix_from(&self, start: usize) -> Name {
        self.sub_name(start, usize::MAX)
    }

    /// Returns true if `self` is a prefix of (or equal to) `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a == b)
    }

    /// Returns the URI form of the name.
    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for component in &self.components {
            out.push('/');
            component.write_uri(&mut out);
        }
        out
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_uri())
    }
}

impl From<Vec<Component>> for Name {
    fn from(components: Vec<Component>) -> Self {
        Self { components }
    }
}
