use core::time::Duration;
use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    time::Instant,
};

use crate::{
    content::ContentObject,
    interest::Interest,
    transport::{Transport, TransportError},
};

// An in-process transport: the flow controller pushes into one end, a local
//  consumer takes objects out of the other.
// Either half notices the other one going away through the reference count.

pub struct QueueTransport {
    inner: Arc<Shared>,
}

pub struct DeliveryReceiver {
    inner: Arc<Shared>,
}

pub fn delivery_queue() -> (QueueTransport, DeliveryReceiver) {
    let inner = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        available: Condvar::new(),
    });

    let transport = QueueTransport {
        inner: Arc::clone(&inner),
    };
    let receiver = DeliveryReceiver { inner };

    (transport, receiver)
}

impl Transport for QueueTransport {
    fn deliver(&mut self, object: &ContentObject) -> Result<(), TransportError> {
        if Arc::strong_count(&self.inner) <= 1 {
            return Err(TransportError::Disconnected);
        }

        self.inner
            .queue
            .lock()
            .map_err(|_| TransportError::Disconnected)?
            .push_back(object.clone());

        self.inner.available.notify_all();
        Ok(())
    }
}

impl Drop for QueueTransport {
    fn drop(&mut self) {
        self.inner.available.notify_all();
    }
}

impl DeliveryReceiver {
    pub fn try_recv(&mut self) -> Result<Option<ContentObject>, TransportError> {
        self.recv_where(|_| true, None)
    }

    /// Waits up to `timeout` for the next object. `Ok(None)` means nothing
    /// arrived in time. A timeout too large to represent waits forever.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ContentObject>, TransportError> {
        self.recv_where(|_| true, Some(timeout))
    }

    /// Waits up to `timeout` for an object satisfying `interest`, leaving any
    /// other queued objects in place.
    pub fn recv_matching(
        &mut self,
        interest: &Interest,
        timeout: Duration,
    ) -> Result<Option<ContentObject>, TransportError> {
        self.recv_where(|o| interest.matches_object(o), Some(timeout))
    }

    pub fn len(&self) -> usize {
        match self.inner.queue.lock() {
            Ok(q) => q.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn recv_where<F>(
        &mut self,
        accept: F,
        timeout: Option<Duration>,
    ) -> Result<Option<ContentObject>, TransportError>
    where
        F: Fn(&ContentObject) -> bool,
    {
        // `None` inside the outer `Some` is a deadline past the end of time
        let deadline = timeout.map(|t| Instant::now().checked_add(t));
        let mut queue = self
            .inner
            .queue
            .lock()
            .map_err(|_| TransportError::Disconnected)?;

        loop {
            if let Some(idx) = queue.iter().position(&accept) {
                return Ok(queue.remove(idx));
            }

            // We only report the disconnect after draining what was delivered
            if Arc::strong_count(&self.inner) <= 1 {
                return Err(TransportError::Disconnected);
            }

            queue = match deadline {
                None => return Ok(None),
                Some(None) => self
                    .inner
                    .available
                    .wait(queue)
                    .map_err(|_| TransportError::Disconnected)?,
                Some(Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.inner
                        .available
                        .wait_timeout(queue, deadline - now)
                        .map_err(|_| TransportError::Disconnected)?
                        .0
                }
            };
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<ContentObject>>,
    available: Condvar,
}
