use core::time::Duration;
use std::sync::Arc;

use crate::{
    clock::Clock,
    content::{ContentObject, PublisherDigest},
    error::Error,
    flow::PutOutcome,
    name::Name,
    platform::{clock::MonotonicClock, flow::FlowController, sha::Sha256Hasher},
    profiles::{add_version, segment_name},
    transport::Transport,
};

/// Publishes content through a shared flow controller, cutting it into
/// numbered segments.
pub struct Writer<T: Transport, C: Clock = MonotonicClock> {
    flow: Arc<FlowController<T, C>>,
    publisher: Option<PublisherDigest>,
    freshness: Option<Duration>,
    segment_size: usize,
    hasher: Sha256Hasher,
}

impl<T: Transport, C: Clock> Writer<T, C> {
    pub const DEFAULT_SEGMENT_SIZE: usize = 4096;

    pub fn new(flow: Arc<FlowController<T, C>>) -> Self {
        Self {
            flow,
            publisher: None,
            freshness: None,
            segment_size: Self::DEFAULT_SEGMENT_SIZE,
            hasher: Sha256Hasher::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: PublisherDigest) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Every segment written from now on goes stale after `freshness`.
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = Some(freshness);
        self
    }

    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size.max(1);
        self
    }

    /// Publishes `content` as segments `0..n` under `name`, returning `n`.
    /// Empty content still produces a single, empty segment.
    pub fn put(&mut self, name: &Name, content: &[u8]) -> Result<u64, Error> {
        if content.is_empty() {
            self.put_segment(name, 0, &[])?;
            return Ok(1);
        }

        let mut segments = 0;
        for chunk in content.chunks(self.segment_size) {
            self.put_segment(name, segments, chunk)?;
            segments += 1;
        }
        Ok(segments)
    }

    /// Stamps `name` with a version from the controller's clock and publishes
    /// under the versioned name, which is returned.
    pub fn new_version(&mut self, name: &Name, content: &[u8]) -> Result<Name, Error> {
        let versioned = add_version(name, self.flow.now()?);
        self.put(&versioned, content)?;
        Ok(versioned)
    }

    pub fn put_object(&self, object: ContentObject) -> Result<PutOutcome, Error> {
        self.flow.put(object)
    }

    pub fn disable_flow_control(&self) -> Result<(), Error> {
        self.flow.disable()
    }

    pub fn set_timeout(&self, timeout: Duration) -> Result<(), Error> {
        self.flow.set_drain_timeout(timeout)
    }

    /// Waits for the buffer to drain, then discards whatever is left.
    /// Returns the number of objects that were never delivered.
    pub fn close(&self) -> Result<usize, Error> {
        let drained = self.flow.before_close();
        let discarded = self.flow.after_close()?;
        drained.map(|_| discarded)
    }

    pub fn flow_controller(&self) -> &Arc<FlowController<T, C>> {
        &self.flow
    }

    fn put_segment(&mut self, name: &Name, segment: u64, chunk: &[u8]) -> Result<(), Error> {
        let mut object = ContentObject::with_hasher(
            segment_name(name, segment),
            self.publisher,
            chunk,
            &mut self.hasher,
        );
        if let Some(freshness) = self.freshness {
            object = object.with_freshness(freshness, &mut self.hasher);
        }
        self.flow.put(object)?;
        Ok(())
    }
}
