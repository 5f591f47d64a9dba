#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub ms_since_1970: u64,
}

impl Timestamp {
    pub fn adding(&self, ms: u64) -> Self {
        Self {
            ms_since_1970: self.ms_since_1970.saturating_add(ms),
        }
    }

    pub fn difference(&self, other: &Self) -> Option<u64> {
        self.ms_since_1970.checked_sub(other.ms_since_1970)
    }
}

pub trait Clock {
    fn now(&mut self) -> Timestamp;
}
