use core::{cmp::Reverse, time::Duration};

use alloc::{collections::BTreeMap, vec::Vec};

use tracing::{debug, trace, warn};

use crate::{
    clock::Timestamp,
    content::ContentObject,
    error::Error,
    interest::{ChildSelector, Interest},
    name::{Name, NameComponent},
    profiles::{segment_from_component, segment_number, split_segment},
    table::InterestTable,
    transport::Transport,
};

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FlowConfig {
    /// Maximum number of buffered, undelivered objects.
    pub highwater: usize,
    /// How long a blocking put waits for a drain before reporting capacity.
    pub put_wait: Duration,
    pub drain_timeout: Duration,
    /// Pending interests older than this are forgotten. `None` keeps them
    /// until they are satisfied.
    pub interest_lifetime: Option<Duration>,
    pub strict_segment_order: bool,
    /// Report an undrained buffer at close as an error instead of a warning.
    pub strict_close: bool,
}

impl FlowConfig {
    pub const DEFAULT_HIGHWATER: usize = 128;
    pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_secs(4);

    pub fn with_highwater(mut self, highwater: usize) -> Self {
        self.highwater = highwater;
        self
    }

    pub fn with_put_wait(mut self, put_wait: Duration) -> Self {
        self.put_wait = put_wait;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn with_interest_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.interest_lifetime = lifetime;
        self
    }

    pub fn with_strict_segment_order(mut self, strict: bool) -> Self {
        self.strict_segment_order = strict;
        self
    }

    pub fn with_strict_close(mut self, strict: bool) -> Self {
        self.strict_close = strict;
        self
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            highwater: Self::DEFAULT_HIGHWATER,
            put_wait: Duration::ZERO,
            drain_timeout: Self::DEFAULT_DRAIN_TIMEOUT,
            interest_lifetime: Some(Self::DEFAULT_INTEREST_LIFETIME),
            strict_segment_order: true,
            strict_close: false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// Handed to the transport for a pending interest.
    Delivered,
    /// Held until an interest asks for it.
    Buffered,
    /// Flow control is disabled, sent without any checks.
    Bypassed,
}

/// Bookkeeping stored with every pending interest.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingInterest {
    seq: u64,
    deadline: Option<Timestamp>,
}

// Highest segment delivered on a stream, and when the stream last moved
#[derive(Copy, Clone, Debug)]
struct LowWater {
    segment: u64,
    touched: Timestamp,
}

// Decided by `admit`, carried out by `commit`
pub(crate) enum Admission {
    Bypass,
    Deliver {
        interest: Interest,
        pending: PendingInterest,
    },
    Buffer,
}

// The producer side of the exchange. Content and interests meet here: whichever
//  arrives second finds the first and the content goes to the transport.
// Nothing in here blocks or reads a clock, every call is handed the current
//  time. The blocking controller wraps this in a mutex.
pub struct FlowState<T: Transport> {
    config: FlowConfig,
    transport: T,
    namespaces: Vec<Name>,
    buffer: BTreeMap<Name, ContentObject>,
    pending: InterestTable<PendingInterest>,
    low_water: BTreeMap<Name, LowWater>,
    // Time of the latest put or interest batch
    now: Timestamp,
    next_seq: u64,
    enabled: bool,
    closed: bool,
}

impl<T: Transport> FlowState<T> {
    pub fn new(config: FlowConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            namespaces: Vec::new(),
            buffer: BTreeMap::new(),
            pending: InterestTable::new(),
            low_water: BTreeMap::new(),
            now: Timestamp { ms_since_1970: 0 },
            next_seq: 0,
            enabled: true,
            closed: false,
        }
    }

    pub fn add_namespace(&mut self, prefix: Name) {
        if !self.namespaces.contains(&prefix) {
            debug!(namespace = %prefix, "Registered namespace");
            self.namespaces.push(prefix);
        }
    }

    /// Stops accepting content under `prefix`. Segment progress for streams
    /// no longer covered by any namespace is forgotten.
    pub fn remove_namespace(&mut self, prefix: &Name) -> bool {
        let before = self.namespaces.len();
        self.namespaces.retain(|ns| ns != prefix);
        if before == self.namespaces.len() {
            return false;
        }

        let namespaces = &self.namespaces;
        self.low_water
            .retain(|stream, _| namespaces.iter().any(|ns| ns.is_prefix_of(stream)));
        true
    }

    pub fn namespaces(&self) -> &[Name] {
        &self.namespaces
    }

    pub fn put(&mut self, object: ContentObject, now: Timestamp) -> Result<PutOutcome, Error> {
        let admission = self.admit(&object, now)?;
        self.commit(object, admission)
    }

    // Everything `put` checks, without touching the buffer or the transport.
    // A capacity error here can be retried after waiting for a drain.
    pub(crate) fn admit(
        &mut self,
        object: &ContentObject,
        now: Timestamp,
    ) -> Result<Admission, Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.enabled {
            return Ok(Admission::Bypass);
        }
        if !self.namespaces.iter().any(|ns| ns.is_prefix_of(object.name())) {
            return Err(Error::Namespace(object.name().clone()));
        }

        self.prune_expired(now);

        if let Some((interest, pending)) = self.best_pending_for(object) {
            return Ok(Admission::Deliver { interest, pending });
        }

        // Replacing an already buffered object does not take more room
        let replaces = self.buffer.contains_key(object.name());
        if !replaces && self.buffer.len() >= self.config.highwater {
            return Err(Error::Capacity {
                highwater: self.config.highwater,
            });
        }

        Ok(Admission::Buffer)
    }

    pub(crate) fn commit(
        &mut self,
        object: ContentObject,
        admission: Admission,
    ) -> Result<PutOutcome, Error> {
        match admission {
            Admission::Bypass => {
                trace!(name = %object.name(), "Flow control disabled, sending directly");
                self.transport.deliver(&object)?;
                Ok(PutOutcome::Bypassed)
            }
            Admission::Deliver { interest, pending } => {
                // The interest stays pending unless the transport took the object
                self.deliver(&object)?;
                self.pending.remove_interest(&interest, &pending);
                trace!(name = %object.name(), interest = %interest.name(), "Satisfied pending interest");
                Ok(PutOutcome::Delivered)
            }
            Admission::Buffer => {
                debug!(name = %object.name(), buffered = self.buffer.len() + 1, "Buffering content");
                self.buffer.insert(object.name().clone(), object);
                Ok(PutOutcome::Buffered)
            }
        }
    }

    /// Returns the number of interests answered from the buffer. The rest are
    /// kept as pending, unless they are outside every namespace.
    pub fn handle_interests<I>(&mut self, interests: I, now: Timestamp) -> Result<usize, Error>
    where
        I: IntoIterator<Item = Interest>,
    {
        self.prune_expired(now);

        let mut delivered = 0;
        for interest in interests {
            if self.handle_interest(interest, now)? {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn handle_interest(&mut self, interest: Interest, now: Timestamp) -> Result<bool, Error> {
        if self.closed {
            debug!(interest = %interest.name(), "Ignoring interest after close");
            return Ok(false);
        }

        let overlaps = self.namespaces.iter().any(|ns| {
            ns.is_prefix_of(interest.name()) || interest.name().is_prefix_of(ns)
        });
        if !overlaps {
            debug!(interest = %interest.name(), "Ignoring interest outside namespaces");
            return Ok(false);
        }
        if !interest.accepts_generated() {
            debug!(interest = %interest.name(), "Ignoring interest that refuses generated content");
            return Ok(false);
        }

        if let Some(name) = self.best_buffered_for(&interest) {
            if let Some(object) = self.buffer.remove(&name) {
                if let Err(err) = self.deliver(&object) {
                    warn!(name = %name, %err, "Delivery failed, keeping content buffered");
                    self.buffer.insert(name, object);
                    return Err(err);
                }
                trace!(name = %name, interest = %interest.name(), "Answered from buffer");
                return Ok(true);
            }
        }

        let pending = PendingInterest {
            seq: self.next_seq,
            deadline: self
                .config
                .interest_lifetime
                .map(|lifetime| now.adding(millis(lifetime))),
        };
        self.next_seq += 1;
        debug!(interest = %interest.name(), "Registered pending interest");
        self.pending.add_interest(interest, pending);
        Ok(false)
    }

    fn best_buffered_for(&self, interest: &Interest) -> Option<Name> {
        // Every name under the prefix sorts right after it, one contiguous run
        let mut candidates = self
            .buffer
            .range(interest.name().clone()..)
            .take_while(|(name, _)| interest.name().is_prefix_of(name))
            .map(|(_, object)| object)
            .filter(|object| {
                interest.matches_object(object) && self.respects_segment_order(interest, object.name())
            });

        let best = match interest.child_selector() {
            Some(ChildSelector::Last) => candidates.last(),
            Some(ChildSelector::Next) | None => candidates.next(),
        };

        // An interest on a full name sorts after the object it names
        let best = best.or_else(|| {
            let parent = interest.name().dropping_last_component()?;
            let object = self.buffer.get(&parent)?;
            interest.matches_object(object).then_some(object)
        });

        best.map(|object| object.name().clone())
    }

    fn best_pending_for(&self, object: &ContentObject) -> Option<(Interest, PendingInterest)> {
        self.pending
            .get_matches(object)
            .into_iter()
            .filter_map(|entry| Some((entry.interest()?, *entry.value())))
            .filter(|(interest, _)| self.respects_segment_order(interest, object.name()))
            .max_by(|a, b| pending_rank(a.0, &a.1).cmp(&pending_rank(b.0, &b.1)))
            .map(|(interest, pending)| (interest.clone(), pending))
    }

    // A NEXT interest on a segmented stream must not skip past a segment that
    //  has not been delivered yet.
    fn respects_segment_order(&self, interest: &Interest, candidate: &Name) -> bool {
        if !self.config.strict_segment_order
            || interest.child_selector() != Some(ChildSelector::Next)
            || candidate.component_count() != interest.name().component_count() + 1
        {
            return true;
        }

        let reference = match interest.reference().and_then(segment_from_component) {
            Some(reference) => reference,
            None => return true,
        };
        let segment = match segment_number(candidate) {
            Some(segment) => segment,
            None => return true,
        };

        let floor = match self.low_water.get(interest.name()) {
            Some(low_water) => reference.max(low_water.segment),
            None => reference,
        };
        segment <= floor.saturating_add(1)
    }

    // Segment progress only counts once the transport has accepted the object
    fn deliver(&mut self, object: &ContentObject) -> Result<(), Error> {
        self.transport.deliver(object)?;
        if let Some((stream, segment)) = split_segment(object.name()) {
            let now = self.now;
            let low_water = self.low_water.entry(stream).or_insert(LowWater {
                segment,
                touched: now,
            });
            low_water.segment = segment.max(low_water.segment);
            low_water.touched = now;
        }
        Ok(())
    }

    fn prune_expired(&mut self, now: Timestamp) {
        self.now = self.now.max(now);

        let removed = self
            .pending
            .retain(|entry| entry.value().deadline.map_or(true, |deadline| deadline > now));
        if removed > 0 {
            debug!(removed, "Pruned expired interests");
        }

        // A stream that has sat idle for a whole interest lifetime with nothing
        //  buffered has no reader left to keep in order
        let idle = match self.config.interest_lifetime {
            Some(lifetime) => millis(lifetime),
            None => return,
        };
        let buffer = &self.buffer;
        let before = self.low_water.len();
        self.low_water.retain(|stream, low_water| {
            let fresh = now.difference(&low_water.touched).map_or(true, |age| age < idle);
            fresh || has_buffered_under(buffer, stream)
        });
        let forgotten = before - self.low_water.len();
        if forgotten > 0 {
            debug!(forgotten, "Forgot idle streams");
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn set_highwater(&mut self, highwater: usize) {
        self.config.highwater = highwater;
    }

    pub fn set_drain_timeout(&mut self, timeout: Duration) {
        self.config.drain_timeout = timeout;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_buffered(&self, name: &Name) -> bool {
        self.buffer.contains_key(name)
    }

    pub fn pending_interests_len(&self) -> usize {
        self.pending.len()
    }

    /// The highest segment of `stream` handed to the transport so far.
    pub fn low_water(&self, stream: &Name) -> Option<u64> {
        self.low_water.get(stream).map(|low_water| low_water.segment)
    }

    pub fn tracked_streams(&self) -> usize {
        self.low_water.len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Drops all buffered content and pending interests, further puts fail.
    /// Returns the number of objects that were never delivered.
    pub fn close(&mut self) -> usize {
        let discarded = self.buffer.len();
        let interests = self.pending.clear();
        if discarded > 0 || interests > 0 {
            warn!(discarded, interests, "Closing with undelivered state");
        }
        self.buffer.clear();
        self.low_water.clear();
        self.closed = true;
        discarded
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn has_buffered_under(buffer: &BTreeMap<Name, ContentObject>, prefix: &Name) -> bool {
    buffer
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(name, _)| prefix.is_prefix_of(name))
}

// Longest name first, then the NEXT interest furthest along, then the oldest
fn pending_rank<'i>(
    interest: &'i Interest,
    pending: &PendingInterest,
) -> (usize, Option<&'i NameComponent>, Reverse<u64>) {
    let reference = match interest.child_selector() {
        Some(ChildSelector::Next) => interest.reference(),
        _ => None,
    };
    (interest.name().component_count(), reference, Reverse(pending.seq))
}
