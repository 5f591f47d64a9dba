use core::time::Duration;

use thiserror::Error;

use crate::{
    name::{MalformedNameError, Name},
    transport::TransportError,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is outside every registered namespace")]
    Namespace(Name),

    #[error("buffer is full at highwater {highwater}")]
    Capacity { highwater: usize },

    #[error("{remaining} objects still buffered after {waited:?}")]
    DrainTimeout { remaining: usize, waited: Duration },

    #[error("nothing arrived for {name} within {waited:?}")]
    Timeout { name: Name, waited: Duration },

    #[error(transparent)]
    MalformedName(#[from] MalformedNameError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("flow controller is closed")]
    Closed,

    // A thread panicked while holding the shared state
    #[error("shared state is poisoned")]
    Poisoned,
}
