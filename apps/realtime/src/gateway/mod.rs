//! Client side of the Focal gateway: wire events, connection management,
//! and listener fan-out.

pub mod client;
pub mod events;
pub mod fanout;
