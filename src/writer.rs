//! Writer sessions.
//!
//! A [`WriterSession`] owns the single engine writer of a partition and
//! decides, according to its [`WriterPolicy`], when that writer commits,
//! closes or gets force-unlocked after a failure.

pub mod holder;
pub mod near_real_time;
pub mod session;

pub use holder::WriterHolder;
pub use near_real_time::NearRealTimeReaders;
pub use session::{SessionState, WriterPolicy, WriterSession};
