//! Circular-buffer channels over a power-of-two ring.
//!
//! A [`Ring`] is a fixed-capacity slab addressed by two monotonically
//! increasing `u64` cursors; the physical slot of any index is
//! `index & (capacity - 1)`. [`Writer`] and [`Reader`] are the raw cursor
//! types; [`Source`] and [`Sink`] layer a channel on top, with a listener
//! registry on the source and [`connect`]/[`connect_via`]/[`async_connect`]
//! to bridge a producer to a consumer inline or through a thread pool.
//!
//! There is deliberately no back-pressure anywhere: writes never block, and
//! a producer that runs more than `capacity` ahead of a consumer silently
//! overwrites unread slots. Detecting overrun is the caller's business.

#![deny(unsafe_op_in_unsafe_fn)]

mod channel;
mod error;
mod reader;
mod ring;
mod writer;

pub use channel::{
    async_connect, channel, connect, connect_via, disconnect, mpsc_channel, spmc_channel,
    Connection, Sink, Source,
};
pub use error::RingError;
pub use reader::Reader;
pub use ring::Ring;
pub use writer::Writer;
