use core::{fmt, time::Duration};

use alloc::boxed::Box;

use crate::{
    hash::{Hasher, Sha256Digest},
    name::Name,
};

/// Digest of the key a publisher signs with.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublisherDigest(pub [u8; 32]);

impl PublisherDigest {
    pub fn from_key<H: Hasher<Digest = Sha256Digest>>(key: &[u8], hasher: &mut H) -> Self {
        hasher.reset();
        hasher.update(key);
        PublisherDigest(hasher.finalize_reset().0)
    }
}

impl fmt::Debug for PublisherDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PublisherDigest(")?;
        for b in self.0[..8].iter() {
            write!(f, "{:02x}", b)?;
        }
        f.write_str("..)")
    }
}

/// A named, immutable payload as handed to the flow controller. Signing has
/// already happened by the time one of these exists; the digest only covers
/// the fields kept here.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentObject {
    name: Name,
    publisher: Option<PublisherDigest>,
    content: Box<[u8]>,
    // How long caches may keep serving this object, `None` for no limit
    freshness: Option<Duration>,
    digest: Sha256Digest,
}

impl ContentObject {
    pub fn with_hasher<H: Hasher<Digest = Sha256Digest>>(
        name: Name,
        publisher: Option<PublisherDigest>,
        content: &[u8],
        hasher: &mut H,
    ) -> Self {
        let mut object = Self {
            name,
            publisher,
            content: Box::from(content),
            freshness: None,
            digest: Sha256Digest([0; 32]),
        };
        object.digest = object.compute_digest(hasher);
        object
    }

    /// Marks the object stale after `freshness`. The freshness is signed
    /// content, so the digest is recomputed.
    pub fn with_freshness<H: Hasher<Digest = Sha256Digest>>(
        mut self,
        freshness: Duration,
        hasher: &mut H,
    ) -> Self {
        self.freshness = Some(freshness);
        self.digest = self.compute_digest(hasher);
        self
    }

    fn compute_digest<H: Hasher<Digest = Sha256Digest>>(&self, hasher: &mut H) -> Sha256Digest {
        hasher.reset();
        hasher.update(&(self.name.component_count() as u64).to_be_bytes());
        for component in self.name.components() {
            hasher.update_framed(component.bytes());
        }
        match &self.publisher {
            Some(publisher) => hasher.update_framed(&publisher.0),
            None => hasher.update_framed(&[]),
        }
        match self.freshness {
            Some(freshness) => {
                let millis = u64::try_from(freshness.as_millis()).unwrap_or(u64::MAX);
                hasher.update_framed(&millis.to_be_bytes());
            }
            None => hasher.update_framed(&[]),
        }
        hasher.update_framed(&self.content);
        hasher.finalize_reset()
    }

    #[cfg(feature = "sha2")]
    pub fn new(name: Name, content: &[u8]) -> Self {
        let mut hasher = crate::platform::sha::Sha256Hasher::new();
        Self::with_hasher(name, None, content, &mut hasher)
    }

    #[cfg(feature = "sha2")]
    pub fn published(name: Name, publisher: PublisherDigest, content: &[u8]) -> Self {
        let mut hasher = crate::platform::sha::Sha256Hasher::new();
        Self::with_hasher(name, Some(publisher), content, &mut hasher)
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn publisher(&self) -> Option<&PublisherDigest> {
        self.publisher.as_ref()
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn freshness(&self) -> Option<Duration> {
        self.freshness
    }

    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    /// The name with the implicit digest component appended.
    pub fn full_name(&self) -> Name {
        self.name.adding_component(self.digest.to_component())
    }

    pub fn complete_name(&self) -> CompleteName<'_> {
        CompleteName {
            name: &self.name,
            publisher: self.publisher.as_ref(),
            digest: Some(&self.digest),
        }
    }
}

impl fmt::Debug for ContentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentObject")
            .field("name", &self.name)
            .field("publisher", &self.publisher)
            .field("content_len", &self.content.len())
            .field("freshness", &self.freshness)
            .field("digest", &self.digest)
            .finish()
    }
}

/// What an interest is matched against: a name plus whatever is known about
/// the content carrying it.
#[derive(Copy, Clone, Debug)]
pub struct CompleteName<'a> {
    pub name: &'a Name,
    pub publisher: Option<&'a PublisherDigest>,
    pub digest: Option<&'a Sha256Digest>,
}

impl<'a> CompleteName<'a> {
    pub fn new(name: &'a Name) -> Self {
        Self {
            name,
            publisher: None,
            digest: None,
        }
    }
}

impl<'a> From<&'a Name> for CompleteName<'a> {
    fn from(value: &'a Name) -> Self {
        CompleteName::new(value)
    }
}

impl<'a> From<&'a ContentObject> for CompleteName<'a> {
    fn from(value: &'a ContentObject) -> Self {
        value.complete_name()
    }
}

#[cfg(all(test, feature = "sha2"))]
mod tests {
    use core::time::Duration;

    use super::{ContentObject, PublisherDigest};
    use crate::{name::Name, platform::sha::Sha256Hasher};

    #[test]
    fn test_digest_covers_all_fields() {
        let name: Name = "/foo/bar".parse().unwrap();
        let a = ContentObject::new(name.clone(), b"test");
        let b = ContentObject::new(name.clone(), b"test");
        let c = ContentObject::new(name.clone(), b"tesu");
        let publisher = PublisherDigest::from_key(b"key", &mut Sha256Hasher::new());
        let d = ContentObject::published(name.clone(), publisher, b"test");

        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_ne!(a.digest(), d.digest());
        assert_eq!(d.publisher(), Some(&publisher));
    }

    #[test]
    fn test_freshness_is_signed() {
        let name: Name = "/foo/bar".parse().unwrap();
        let mut hasher = Sha256Hasher::new();
        let plain = ContentObject::new(name.clone(), b"test");
        assert_eq!(plain.freshness(), None);

        let fresh = plain.clone().with_freshness(Duration::from_secs(5), &mut hasher);
        assert_eq!(fresh.freshness(), Some(Duration::from_secs(5)));
        assert_eq!(fresh.content(), plain.content());
        assert_ne!(fresh.digest(), plain.digest());

        let again = ContentObject::new(name, b"test").with_freshness(Duration::from_secs(5), &mut hasher);
        assert_eq!(again, fresh);
        let other = plain.with_freshness(Duration::from_secs(6), &mut hasher);
        assert_ne!(other.digest(), fresh.digest());
    }

    #[test]
    fn test_full_name() {
        let name: Name = "/foo/bar".parse().unwrap();
        let object = ContentObject::new(name.clone(), b"v1s1");
        let full = object.full_name();
        assert_eq!(full.component_count(), 3);
        assert!(name.is_prefix_of(&full));
        assert_eq!(full.last_component().unwrap().bytes(), &object.digest().0[..]);
    }
}
