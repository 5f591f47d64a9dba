use core::{fmt, str::FromStr};

use alloc::{boxed::Box, vec::Vec};

use thiserror::Error;

pub const SEPARATOR: char = '/';

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameComponent {
    bytes: Box<[u8]>,
}

impl NameComponent {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: Box::from(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&[u8]> for NameComponent {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for NameComponent {
    fn from(value: Vec<u8>) -> Self {
        Self {
            bytes: value.into_boxed_slice(),
        }
    }
}

impl From<&str> for NameComponent {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl AsRef<[u8]> for NameComponent {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.bytes.iter() {
            if is_unreserved(*byte) {
                write!(f, "{}", *byte as char)?;
            } else {
                write!(f, "%{:02X}", byte)?;
            }
        }
        // Components made only of periods would read back as relative paths
        if self.bytes.iter().all(|b| *b == b'.') {
            f.write_str("...")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedNameError {
    #[error("name strings must begin with '/'")]
    MissingSeparator,
    #[error("empty component at position {0}")]
    EmptyComponent(usize),
    #[error("relative component at position {0}")]
    RelativeComponent(usize),
    #[error("invalid percent escape in component {0}")]
    InvalidEscape(usize),
}

/// An ordered sequence of opaque components.
///
/// The zero-component name is the root. Names are never modified in place:
/// `adding_component`, `dropping_last_component` and `truncated` build new
/// names. The derived order compares component by component and puts a strict
/// prefix before everything it prefixes, so every name sharing a prefix `P`
/// sorts into one contiguous run starting at `P`.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn from_components<I, C>(components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            components: components
                .into_iter()
                .map(|c| NameComponent::new(c.as_ref()))
                .collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    pub fn last_component(&self) -> Option<&NameComponent> {
        self.components.last()
    }

    pub fn components(&self) -> impl DoubleEndedIterator<Item = &NameComponent> + '_ {
        self.components.iter()
    }

    pub fn adding_component(&self, component: impl Into<NameComponent>) -> Self {
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.extend_from_slice(&self.components);
        components.push(component.into());
        Self { components }
    }

    pub fn adding_components<I, C>(&self, suffix: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<NameComponent>,
    {
        let mut components = self.components.clone();
        components.extend(suffix.into_iter().map(Into::into));
        Self { components }
    }

    /// The parent name, or `None` for the root.
    pub fn dropping_last_component(&self) -> Option<Self> {
        let (_, parent) = self.components.split_last()?;
        Some(Self {
            components: parent.to_vec(),
        })
    }

    /// The first `count` components (the whole name if it is shorter).
    pub fn truncated(&self, count: usize) -> Self {
        let count = count.min(self.components.len());
        Self {
            components: self.components[..count].to_vec(),
        }
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self.components[..] == other.components[..self.components.len()]
    }

    /// Compares only the first `limit` components. Asking for more components
    /// than this name has compares everything available, which then requires
    /// both names to have the same length.
    pub fn equals_up_to(&self, other: &Name, limit: usize) -> bool {
        if limit > self.component_count() && other.component_count() != self.component_count() {
            return false;
        }
        let limit = limit.min(self.component_count()).min(other.component_count());
        self.components[..limit] == other.components[..limit]
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in self.components.iter() {
            write!(f, "{}{}", SEPARATOR, component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("Name(/)");
        }
        write!(f, "Name({})", self)
    }
}

impl FromStr for Name {
    type Err = MalformedNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Name::new());
        }
        let rest = s
            .strip_prefix(SEPARATOR)
            .ok_or(MalformedNameError::MissingSeparator)?;
        // A single trailing separator after a component does not introduce
        //  another one, but "//" is still an empty component
        let rest = match rest.strip_suffix(SEPARATOR) {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => rest,
        };
        if rest.is_empty() {
            return Ok(Name::new());
        }

        let mut components = Vec::new();
        for (index, part) in rest.split(SEPARATOR).enumerate() {
            components.push(parse_component(part, index)?);
        }
        Ok(Name { components })
    }
}

impl TryFrom<&str> for Name {
    type Error = MalformedNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn parse_component(part: &str, index: usize) -> Result<NameComponent, MalformedNameError> {
    if part.is_empty() {
        return Err(MalformedNameError::EmptyComponent(index));
    }

    let raw = part.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hi = raw.get(i + 1).and_then(|b| hex_value(*b));
            let lo = raw.get(i + 2).and_then(|b| hex_value(*b));
            match (hi, lo) {
                (Some(hi), Some(lo)) => bytes.push(hi << 4 | lo),
                _ => return Err(MalformedNameError::InvalidEscape(index)),
            }
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }

    // Only the literal text decides about periods, "%2E" is always a plain byte
    if raw.iter().all(|b| *b == b'.') {
        if raw.len() < 3 {
            return Err(MalformedNameError::RelativeComponent(index));
        }
        bytes.truncate(raw.len() - 3);
    }

    Ok(NameComponent::from(bytes))
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
