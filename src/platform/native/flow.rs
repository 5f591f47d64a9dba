use core::time::Duration;

use std::{
    sync::{Condvar, Mutex, MutexGuard},
    time::Instant,
};

use tracing::warn;

use crate::{
    clock::{Clock, Timestamp},
    content::ContentObject,
    error::Error,
    flow::{FlowConfig, FlowState, PutOutcome},
    interest::Interest,
    name::Name,
    platform::native::clock::MonotonicClock,
    reader::InterestSink,
    transport::Transport,
};

/// Thread-safe producer flow control.
///
/// Producers call [`put`](Self::put), whatever receives interests calls
/// [`handle_interests`](Self::handle_interests). Matching and the resulting
/// buffer change happen under one lock, so an interest and its content can
/// never miss each other.
pub struct FlowController<T, C = MonotonicClock>
where
    T: Transport,
    C: Clock,
{
    locked: Mutex<Locked<T, C>>,
    // Signalled whenever the buffer shrinks or the highwater changes
    changed: Condvar,
}

struct Locked<T: Transport, C: Clock> {
    flow: FlowState<T>,
    clock: C,
}

impl<T: Transport> FlowController<T, MonotonicClock> {
    pub fn new(transport: T) -> Self {
        Self::with_config(FlowConfig::default(), transport)
    }

    pub fn with_namespace(namespace: Name, transport: T) -> Self {
        let controller = Self::new(transport);
        if let Ok(mut locked) = controller.locked.lock() {
            locked.flow.add_namespace(namespace);
        }
        controller
    }

    pub fn with_config(config: FlowConfig, transport: T) -> Self {
        Self::with_clock(config, transport, MonotonicClock::new())
    }
}

impl<T, C> FlowController<T, C>
where
    T: Transport,
    C: Clock,
{
    pub fn with_clock(config: FlowConfig, transport: T, clock: C) -> Self {
        Self {
            locked: Mutex::new(Locked {
                flow: FlowState::new(config, transport),
                clock,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn add_name_space(&self, namespace: Name) -> Result<(), Error> {
        self.lock()?.flow.add_namespace(namespace);
        Ok(())
    }

    pub fn remove_name_space(&self, namespace: &Name) -> Result<bool, Error> {
        Ok(self.lock()?.flow.remove_namespace(namespace))
    }

    /// Delivers `object` to a pending interest or buffers it. With the buffer
    /// at its highwater this waits up to the configured `put_wait` for a
    /// drain, re-checking capacity each time the buffer shrinks.
    pub fn put(&self, object: ContentObject) -> Result<PutOutcome, Error> {
        let mut locked = self.lock()?;
        let deadline = Instant::now().checked_add(locked.flow.config().put_wait);

        loop {
            let now = locked.clock.now();
            match locked.flow.admit(&object, now) {
                Ok(admission) => return locked.flow.commit(object, admission),
                Err(Error::Capacity { highwater }) => {
                    locked = match self.wait_changed(locked, deadline)? {
                        Some(locked) => locked,
                        None => return Err(Error::Capacity { highwater }),
                    };
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Answers what it can from the buffer and keeps the rest pending.
    /// Returns the number of interests answered right away.
    pub fn handle_interests<I>(&self, interests: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = Interest>,
    {
        let result = {
            let mut locked = self.lock()?;
            let now = locked.clock.now();
            locked.flow.handle_interests(interests, now)
        };
        self.changed.notify_all();
        result
    }

    /// Blocks until nothing is buffered. A timeout too large to represent
    /// waits indefinitely.
    pub fn wait_for_put_drain(&self, timeout: Duration) -> Result<(), Error> {
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        let mut locked = self.lock()?;

        loop {
            let remaining = locked.flow.buffered_len();
            if remaining == 0 {
                return Ok(());
            }

            locked = match self.wait_changed(locked, deadline)? {
                Some(locked) => locked,
                None => {
                    return Err(Error::DrainTimeout {
                        remaining,
                        waited: start.elapsed(),
                    })
                }
            };
        }
    }

    pub fn set_highwater(&self, highwater: usize) -> Result<(), Error> {
        self.lock()?.flow.set_highwater(highwater);
        self.changed.notify_all();
        Ok(())
    }

    pub fn highwater(&self) -> Result<usize, Error> {
        Ok(self.lock()?.flow.config().highwater)
    }

    pub fn set_drain_timeout(&self, timeout: Duration) -> Result<(), Error> {
        self.lock()?.flow.set_drain_timeout(timeout);
        Ok(())
    }

    /// Sends every following put straight to the transport.
    pub fn disable(&self) -> Result<(), Error> {
        self.lock()?.flow.set_enabled(false);
        Ok(())
    }

    pub fn enable(&self) -> Result<(), Error> {
        self.lock()?.flow.set_enabled(true);
        Ok(())
    }

    pub fn is_enabled(&self) -> Result<bool, Error> {
        Ok(self.lock()?.flow.is_enabled())
    }

    /// Gives the buffer one last chance to drain. Content left over is
    /// logged, and only reported as an error with `strict_close`.
    pub fn before_close(&self) -> Result<(), Error> {
        let (timeout, strict) = {
            let locked = self.lock()?;
            let config = locked.flow.config();
            (config.drain_timeout, config.strict_close)
        };

        match self.wait_for_put_drain(timeout) {
            Err(Error::DrainTimeout { remaining, waited }) => {
                warn!(remaining, ?waited, "Closing with undelivered content");
                if strict {
                    Err(Error::DrainTimeout { remaining, waited })
                } else {
                    Ok(())
                }
            }
            other => other,
        }
    }

    /// Discards whatever is left, returning the number of undelivered objects.
    pub fn after_close(&self) -> Result<usize, Error> {
        let discarded = self.lock()?.flow.close();
        self.changed.notify_all();
        Ok(discarded)
    }

    pub fn buffered_len(&self) -> Result<usize, Error> {
        Ok(self.lock()?.flow.buffered_len())
    }

    pub fn pending_interests_len(&self) -> Result<usize, Error> {
        Ok(self.lock()?.flow.pending_interests_len())
    }

    pub fn low_water(&self, stream: &Name) -> Result<Option<u64>, Error> {
        Ok(self.lock()?.flow.low_water(stream))
    }

    pub fn now(&self) -> Result<Timestamp, Error> {
        Ok(self.lock()?.clock.now())
    }

    pub fn with_transport<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut T) -> R,
    {
        Ok(f(self.lock()?.flow.transport_mut()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Locked<T, C>>, Error> {
        self.locked.lock().map_err(|_| Error::Poisoned)
    }

    // Waits for the next change, `None` once `deadline` has passed.
    // Without a deadline this waits for as long as it takes.
    fn wait_changed<'a>(
        &self,
        locked: MutexGuard<'a, Locked<T, C>>,
        deadline: Option<Instant>,
    ) -> Result<Option<MutexGuard<'a, Locked<T, C>>>, Error> {
        let deadline = match deadline {
            Some(deadline) => deadline,
            None => return self.changed.wait(locked).map(Some).map_err(|_| Error::Poisoned),
        };

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        let (locked, _) = self
            .changed
            .wait_timeout(locked, deadline - now)
            .map_err(|_| Error::Poisoned)?;
        Ok(Some(locked))
    }
}

impl<T, C> InterestSink for FlowController<T, C>
where
    T: Transport,
    C: Clock,
{
    fn express_interests(&self, interests: Vec<Interest>) -> Result<(), Error> {
        self.handle_interests(interests).map(|_| ())
    }
}

#[cfg(all(test, feature = "sha2"))]
mod tests {
    use core::time::Duration;
    use std::{
        collections::BTreeSet,
        sync::Arc,
        thread::{sleep, spawn},
    };

    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    use super::FlowController;
    use crate::{
        clock::{Clock, Timestamp},
        content::ContentObject,
        error::Error,
        flow::{FlowConfig, PutOutcome},
        interest::Interest,
        name::Name,
        platform::queue::{delivery_queue, DeliveryReceiver, QueueTransport},
        profiles::{add_version, segment_name},
        reader::Reader,
    };

    const NO_WAIT: Duration = Duration::ZERO;

    struct Fixture {
        name: Name,
        v1: Name,
        flow: Arc<FlowController<QueueTransport>>,
        reader: Reader<Arc<FlowController<QueueTransport>>>,
    }

    impl Fixture {
        fn new(config: FlowConfig) -> Self {
            let name: Name = "/foo/bar".parse().unwrap();
            let v1 = add_version(&name, Timestamp { ms_since_1970: 1_000 });
            let (transport, receiver) = delivery_queue();
            let flow = Arc::new(FlowController::with_config(config, transport));
            flow.add_name_space(name.clone()).unwrap();
            let reader = Reader::new(Arc::clone(&flow), receiver);
            Self {
                name,
                v1,
                flow,
                reader,
            }
        }

        fn object(&self) -> ContentObject {
            ContentObject::new(self.name.clone(), b"test")
        }

        fn segment(&self, n: u64) -> ContentObject {
            let content = format!("v1s{}", n);
            ContentObject::new(segment_name(&self.v1, n), content.as_bytes())
        }

        fn poll(&mut self) -> Option<ContentObject> {
            self.reader.receiver_mut().try_recv().unwrap()
        }

        fn next_after(&mut self, object: &ContentObject) -> ContentObject {
            self.reader.get_next(object.name(), 3, NO_WAIT).unwrap()
        }

        fn latest_after(&mut self, object: &ContentObject) -> ContentObject {
            self.reader.get_latest(object.name(), 3, NO_WAIT).unwrap()
        }
    }

    fn detached() -> (FlowController<QueueTransport>, DeliveryReceiver) {
        let (transport, receiver) = delivery_queue();
        (FlowController::new(transport), receiver)
    }

    fn producer_names(producer: usize, count: usize) -> Vec<Name> {
        (0..count)
            .map(|n| format!("/foo/bar/p{}/{}", producer, n).parse().unwrap())
            .collect()
    }

    #[test]
    fn test_basic_namespaces() {
        let (flow, _receiver) = detached();
        let object = ContentObject::new("/foo/bar".parse().unwrap(), b"test");

        assert!(matches!(flow.put(object.clone()), Err(Error::Namespace(_))));
        flow.add_name_space("/bar".parse().unwrap()).unwrap();
        assert!(matches!(flow.put(object.clone()), Err(Error::Namespace(_))));
        flow.add_name_space("/foo".parse().unwrap()).unwrap();
        assert!(flow.put(object.clone()).is_ok());

        assert!(flow.remove_name_space(&"/foo".parse().unwrap()).unwrap());
        assert!(matches!(flow.put(object), Err(Error::Namespace(_))));
    }

    #[test]
    fn test_interest_first() {
        let mut f = Fixture::new(FlowConfig::default());
        f.flow.handle_interests([Interest::new("/bar".parse().unwrap())]).unwrap();
        f.flow.put(f.object()).unwrap();
        assert_eq!(f.poll(), None);

        f.flow.handle_interests([Interest::new("/foo".parse().unwrap())]).unwrap();
        // The first put is still buffered and answers the new interest
        assert_eq!(f.poll(), Some(f.object()));

        f.flow.handle_interests([Interest::new("/foo".parse().unwrap())]).unwrap();
        assert_eq!(f.flow.put(f.object()).unwrap(), PutOutcome::Delivered);
        assert_eq!(f.poll(), Some(f.object()));
        assert_eq!(f.flow.buffered_len().unwrap(), 0);
    }

    #[test]
    fn test_next_before_put() {
        let mut f = Fixture::new(FlowConfig::default());
        f.flow.handle_interests([Interest::next(f.segment(2).name(), 3)]).unwrap();
        f.flow.put(f.segment(1)).unwrap();
        assert_eq!(f.poll(), None);
        f.flow.put(f.segment(3)).unwrap();
        assert_eq!(f.poll(), Some(f.segment(3)));
    }

    #[test]
    fn test_last_before_put() {
        let mut f = Fixture::new(FlowConfig::default());
        f.flow.handle_interests([Interest::last(f.segment(2).name(), 3)]).unwrap();
        f.flow.put(f.segment(1)).unwrap();
        assert_eq!(f.poll(), None);
        f.flow.put(f.segment(3)).unwrap();
        assert_eq!(f.poll(), Some(f.segment(3)));
    }

    #[test]
    fn test_random_order_puts() {
        let mut rng = StdRng::seed_from_u64(1701);
        for _ in 0..8 {
            let mut f = Fixture::new(FlowConfig::default());
            let mut order = [1, 2, 3, 4];
            order.shuffle(&mut rng);
            for n in order {
                f.flow.put(f.segment(n)).unwrap();
            }

            let v1 = f.v1.clone();
            let mut co = f.reader.get_name(&v1, NO_WAIT).unwrap();
            assert_eq!(co, f.segment(1));
            for n in 2..=4 {
                co = f.next_after(&co);
                assert_eq!(co, f.segment(n));
            }
        }
    }

    #[test]
    fn test_out_of_order_never_skips() {
        let mut f = Fixture::new(FlowConfig::default());
        f.flow.put(f.segment(4)).unwrap();

        // Segment 4 may not stand in for the missing 1
        let first = f.reader.get_next(&segment_name(&f.v1, 0), 3, NO_WAIT);
        assert!(matches!(first, Err(Error::Timeout { .. })));

        // The pending interest picks up segment 1 as soon as it arrives
        assert_eq!(f.flow.put(f.segment(1)).unwrap(), PutOutcome::Delivered);
        let co = f.poll().unwrap();
        assert_eq!(co, f.segment(1));

        f.flow.put(f.segment(2)).unwrap();
        f.flow.put(f.segment(3)).unwrap();
        let co = f.next_after(&co);
        assert_eq!(co, f.segment(2));
        let co = f.next_after(&co);
        assert_eq!(co, f.segment(3));
        assert_eq!(f.next_after(&co), f.segment(4));
    }

    #[test]
    fn test_mixed_order_interest_put() {
        let mut f = Fixture::new(FlowConfig::default());

        f.flow.put(f.segment(1)).unwrap();
        let v1 = f.v1.clone();
        let co = f.reader.get_name(&v1, NO_WAIT).unwrap();
        assert_eq!(co, f.segment(1));

        f.flow.handle_interests([Interest::next(co.name(), 3)]).unwrap();
        f.flow.put(f.segment(2)).unwrap();
        assert_eq!(f.poll(), Some(f.segment(2)));

        // Asking after segment 1 again must not hand out 3 before 2 was seen
        f.flow.put(f.segment(3)).unwrap();
        let co = f.next_after(&co);
        assert_eq!(co, f.segment(3));
        f.flow.put(f.segment(4)).unwrap();
        assert_eq!(f.next_after(&co), f.segment(4));
        assert_eq!(f.flow.low_water(&v1).unwrap(), Some(4));
    }

    #[test]
    fn test_wait_for_put_drain() {
        let mut f = Fixture::new(FlowConfig::default());
        for n in [2, 4, 1, 3] {
            f.flow.put(f.segment(n)).unwrap();
        }
        let s1 = f.segment(1);
        assert_eq!(f.latest_after(&s1), f.segment(4));
        assert_eq!(f.latest_after(&s1), f.segment(3));
        assert_eq!(f.latest_after(&s1), f.segment(2));
        f.reader.get_name(s1.name(), NO_WAIT).unwrap();

        assert!(f.flow.wait_for_put_drain(Duration::from_millis(100)).is_ok());
        f.flow.put(f.object()).unwrap();
        assert!(matches!(
            f.flow.wait_for_put_drain(Duration::from_millis(100)),
            Err(Error::DrainTimeout { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_highwater_fail() {
        let f = Fixture::new(FlowConfig::default());
        f.flow.set_highwater(4).unwrap();
        for n in 1..=4 {
            assert_eq!(f.flow.put(f.segment(n)).unwrap(), PutOutcome::Buffered);
        }
        assert!(matches!(
            f.flow.put(f.segment(5)),
            Err(Error::Capacity { highwater: 4 })
        ));
        assert_eq!(f.flow.buffered_len().unwrap(), 4);
    }

    #[test]
    fn test_highwater_with_drain() {
        let config = FlowConfig::default()
            .with_highwater(4)
            .with_put_wait(Duration::from_secs(10));
        let f = Fixture::new(config);
        for n in 1..=4 {
            f.flow.put(f.segment(n)).unwrap();
        }

        let s1 = f.segment(1);
        let s5 = f.segment(5);
        let Fixture { flow, mut reader, .. } = f;
        let helper = spawn(move || {
            sleep(Duration::from_millis(300));
            reader.get_name(s1.name(), Duration::from_secs(1))
        });

        // Waits for the helper to drain segment 1
        assert_eq!(flow.put(s5).unwrap(), PutOutcome::Buffered);
        assert!(helper.join().unwrap().is_ok());
        assert_eq!(flow.buffered_len().unwrap(), 4);
    }

    #[test]
    fn test_unbounded_waits() {
        let config = FlowConfig::default()
            .with_highwater(1)
            .with_put_wait(Duration::MAX);
        let f = Fixture::new(config);
        assert!(f.flow.wait_for_put_drain(Duration::MAX).is_ok());
        f.flow.put(f.segment(1)).unwrap();

        let s1 = f.segment(1);
        let s2 = f.segment(2);
        let Fixture { flow, mut reader, .. } = f;
        let helper = spawn(move || {
            sleep(Duration::from_millis(100));
            reader.get_name(s1.name(), Duration::MAX)
        });

        // Blocks without a deadline until the helper takes segment 1
        assert_eq!(flow.put(s2).unwrap(), PutOutcome::Buffered);
        assert!(helper.join().unwrap().is_ok());
        assert_eq!(flow.buffered_len().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_puts_and_interests() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 25;

        let (transport, mut receiver) = delivery_queue();
        let config = FlowConfig::default().with_interest_lifetime(None);
        let flow = Arc::new(FlowController::with_config(config, transport));
        flow.add_name_space("/foo/bar".parse().unwrap()).unwrap();

        let mut handles = Vec::new();
        for thread in 0..THREADS {
            let producer = Arc::clone(&flow);
            handles.push(spawn(move || {
                for name in producer_names(thread, PER_THREAD) {
                    let content = name.to_string();
                    producer.put(ContentObject::new(name, content.as_bytes())).unwrap();
                }
            }));

            let consumer = Arc::clone(&flow);
            handles.push(spawn(move || {
                let mut names = producer_names(thread, PER_THREAD);
                names.shuffle(&mut StdRng::seed_from_u64(thread as u64));
                for name in names {
                    consumer.handle_interests([Interest::new(name)]).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = BTreeSet::new();
        while let Some(object) = receiver.try_recv().unwrap() {
            assert_eq!(object.content(), object.name().to_string().as_bytes());
            assert!(seen.insert(object.name().clone()), "{} delivered twice", object.name());
        }
        assert_eq!(seen.len(), THREADS * PER_THREAD);
        assert_eq!(flow.buffered_len().unwrap(), 0);
        assert_eq!(flow.pending_interests_len().unwrap(), 0);
    }

    #[test]
    fn test_disable_bypasses() {
        let mut f = Fixture::new(FlowConfig::default().with_highwater(0));
        f.flow.disable().unwrap();
        assert!(!f.flow.is_enabled().unwrap());

        let outside = ContentObject::new("/elsewhere".parse().unwrap(), b"x");
        assert_eq!(f.flow.put(outside.clone()).unwrap(), PutOutcome::Bypassed);
        assert_eq!(f.poll(), Some(outside));

        f.flow.enable().unwrap();
        assert!(matches!(f.flow.put(f.object()), Err(Error::Capacity { .. })));
    }

    #[test]
    fn test_close() {
        let f = Fixture::new(FlowConfig::default().with_drain_timeout(Duration::from_millis(50)));
        f.flow.put(f.segment(1)).unwrap();

        assert!(f.flow.before_close().is_ok());
        assert_eq!(f.flow.after_close().unwrap(), 1);
        assert!(matches!(f.flow.put(f.segment(2)), Err(Error::Closed)));

        let strict = FlowConfig::default()
            .with_drain_timeout(Duration::from_millis(50))
            .with_strict_close(true);
        let f = Fixture::new(strict);
        f.flow.put(f.segment(1)).unwrap();
        assert!(matches!(f.flow.before_close(), Err(Error::DrainTimeout { .. })));
    }

    #[test]
    fn test_custom_clock_expires_interests() {
        struct ManualClock(Arc<std::sync::Mutex<u64>>);
        impl Clock for ManualClock {
            fn now(&mut self) -> Timestamp {
                Timestamp {
                    ms_since_1970: self.0.lock().map(|t| *t).unwrap_or(0),
                }
            }
        }

        let time = Arc::new(std::sync::Mutex::new(0));
        let clock = ManualClock(Arc::clone(&time));
        let flow = FlowController::with_clock(FlowConfig::default(), Vec::<ContentObject>::new(), clock);
        flow.add_name_space("/foo".parse().unwrap()).unwrap();
        flow.handle_interests([Interest::new("/foo".parse().unwrap())]).unwrap();
        assert_eq!(flow.pending_interests_len().unwrap(), 1);

        *time.lock().unwrap() = 10_000;
        let object = ContentObject::new("/foo/x".parse().unwrap(), b"x");
        assert_eq!(flow.put(object).unwrap(), PutOutcome::Buffered);
        assert_eq!(flow.pending_interests_len().unwrap(), 0);
        assert_eq!(flow.with_transport(|t| t.len()).unwrap(), 0);
    }
}
