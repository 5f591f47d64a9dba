use core::fmt;

use crate::name::NameComponent;

pub trait Hasher {
    type Digest;
    fn reset(&mut self);
    fn update(&mut self, input: &[u8]);
    fn finalize_reset(&mut self) -> Self::Digest;

    // Length-prefixed so that adjacent fields cannot run into each other
    fn update_framed(&mut self, input: &[u8]) {
        self.update(&(input.len() as u64).to_be_bytes());
        self.update(input);
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sha256Digest(pub [u8; 32]);

impl Sha256Digest {
    /// The implicit final component that turns a content name into its full name.
    pub fn to_component(&self) -> NameComponent {
        NameComponent::new(&self.0)
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0[..8].iter() {
            write!(f, "{:02x}", b)?;
        }
        f.write_str("..")
    }
}
