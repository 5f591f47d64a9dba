pub mod clock;
pub mod flow;
pub mod queue;

use crate::platform::native::{clock::MonotonicClock, flow::FlowController, queue::QueueTransport};

/// A flow controller feeding an in-process delivery queue.
pub type DefaultFlowController = FlowController<QueueTransport, MonotonicClock>;
