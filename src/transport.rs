use alloc::vec::Vec;

use thiserror::Error;

use crate::content::ContentObject;

// The transport is whatever carries content away from the flow controller.
// It is handed every object exactly once, fully formed, and applies its own
//  backpressure if it has any.
// Objects are lent rather than moved, so a failed delivery leaves the object
//  with the flow controller.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is disconnected")]
    Disconnected,
}

pub trait Transport {
    fn deliver(&mut self, object: &ContentObject) -> Result<(), TransportError>;
}

impl Transport for Vec<ContentObject> {
    fn deliver(&mut self, object: &ContentObject) -> Result<(), TransportError> {
        self.push(object.clone());
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn deliver(&mut self, object: &ContentObject) -> Result<(), TransportError> {
        (**self).deliver(object)
    }
}
