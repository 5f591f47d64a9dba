use core::time::Duration;
use std::sync::Arc;

use crate::{
    content::ContentObject,
    error::Error,
    interest::Interest,
    name::Name,
    platform::queue::DeliveryReceiver,
};

/// Anything interests can be sent into.
pub trait InterestSink {
    fn express_interests(&self, interests: Vec<Interest>) -> Result<(), Error>;
}

impl<S: InterestSink + ?Sized> InterestSink for &S {
    fn express_interests(&self, interests: Vec<Interest>) -> Result<(), Error> {
        (**self).express_interests(interests)
    }
}

impl<S: InterestSink + ?Sized> InterestSink for Arc<S> {
    fn express_interests(&self, interests: Vec<Interest>) -> Result<(), Error> {
        (**self).express_interests(interests)
    }
}

/// Pulls content by expressing one interest at a time and waiting for the
/// matching delivery.
pub struct Reader<S: InterestSink> {
    sink: S,
    receiver: DeliveryReceiver,
}

impl<S: InterestSink> Reader<S> {
    pub fn new(sink: S, receiver: DeliveryReceiver) -> Self {
        Self { sink, receiver }
    }

    pub fn get(&mut self, interest: Interest, timeout: Duration) -> Result<ContentObject, Error> {
        self.sink.express_interests(vec![interest.clone()])?;
        match self.receiver.recv_matching(&interest, timeout)? {
            Some(object) => Ok(object),
            None => Err(Error::Timeout {
                name: interest.name().clone(),
                waited: timeout,
            }),
        }
    }

    pub fn get_name(&mut self, name: &Name, timeout: Duration) -> Result<ContentObject, Error> {
        self.get(Interest::new(name.clone()), timeout)
    }

    /// The child of `name.truncated(prefix_count)` that follows `name`.
    pub fn get_next(
        &mut self,
        name: &Name,
        prefix_count: usize,
        timeout: Duration,
    ) -> Result<ContentObject, Error> {
        self.get(Interest::next(name, prefix_count), timeout)
    }

    /// The greatest child of `name.truncated(prefix_count)` later than `name`.
    pub fn get_latest(
        &mut self,
        name: &Name,
        prefix_count: usize,
        timeout: Duration,
    ) -> Result<ContentObject, Error> {
        self.get(Interest::last(name, prefix_count), timeout)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn receiver_mut(&mut self) -> &mut DeliveryReceiver {
        &mut self.receiver
    }
}
