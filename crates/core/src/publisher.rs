//! Outbound event sink

use dashd_types::Event;

/// Destination for pipeline events
///
/// Publishing is fire-and-forget: implementations log and drop failures,
/// they never report them back to the pipeline.
pub trait Publisher: Send {
    fn publish(&mut self, event: &Event);
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, event: &Event) {
        (**self).publish(event)
    }
}
