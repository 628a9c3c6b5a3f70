//! Identifiers handed out by the event bus.
//!
//! Both wrap a ULID, so ids sort in creation order in logs. They are
//! process-local handles and never parsed back from text.

use std::fmt;
use ulid::Ulid;

macro_rules! bus_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Ulid);

        impl $name {
            /// Allocates a fresh id.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Milliseconds since the Unix epoch at which the id was allocated.
            #[must_use]
            pub fn allocated_at_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "_{}"), self.0)
            }
        }
    };
}

bus_id!(
    /// One listener registration on an event bus.
    ///
    /// Returned by `on`/`on_async` and used to remove that exact
    /// registration with `off`.
    ListenerId,
    "lsn"
);

bus_id!(
    /// A single dispatch of an event to its listeners.
    DispatchId,
    "dsp"
);
