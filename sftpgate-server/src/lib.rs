//! SFTP v3 session engine.
//!
//! [`serve`] runs one session over a pair of byte-stream halves: a reader
//! task decodes framed packets into a bounded inbox, a dispatcher routes
//! each request either straight to the VFS or onto the FIFO queue of the
//! file handle it targets, and a single writer task encodes responses back
//! onto the wire. Each open handle gets its own worker so operations on one
//! file stay strictly ordered while unrelated handles proceed concurrently.

mod longname;
mod paths;
mod session;

pub use session::{serve, SessionOptions};
