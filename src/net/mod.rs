//! UDP multicast transport

mod receiver;
mod sender;

pub use receiver::Receiver;
pub use sender::MulticastSender;
