/*! Time structures.

The `time` module contains the clock representation shared by the wire timing block and the link
devices.

 - [Instant] is used to represent absolute time, in nanoseconds.
 - [Duration] is used to represet relative time.

All four fields of the wire timing block are nanosecond counters. Client and server clocks are not
comparable unless they are synchronized by other means (e.g. PTP); the same holds for hardware and
software clocks on a single host.

[Instant]: struct.Instant.html
[Duration]: struct.Duration.html
*/
use core::{fmt, ops};
pub use core::time::Duration;

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around a `u64` value that represents a number of nanoseconds,
/// monotonically increasing since an arbitrary moment in time, such as system startup or the unix
/// epoch.
///
/// * A value of `0` is inherently arbitrary and also marks a timestamp that was never taken.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    pub nanos: u64,
}

impl Instant {
    /// An instant that was never measured.
    pub const UNSET: Instant = Instant { nanos: 0 };

    /// Create a new `Instant` from a number of nanoseconds.
    pub fn from_nanos<T: Into<u64>>(nanos: T) -> Instant {
        Instant { nanos: nanos.into() }
    }

    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<u64>>(millis: T) -> Instant {
        Instant { nanos: millis.into() * 1_000_000 }
    }

    /// Create a new `Instant` from the current [std::time::SystemTime].
    ///
    /// See [std::time::SystemTime::now]
    ///
    /// [std::time::SystemTime]: https://doc.rust-lang.org/std/time/struct.SystemTime.html
    /// [std::time::SystemTime::now]: https://doc.rust-lang.org/std/time/struct.SystemTime.html#method.now
    pub fn now() -> Instant {
        Self::from(::std::time::SystemTime::now())
    }

    /// Check if this timestamp was actually taken.
    pub fn is_set(&self) -> bool {
        self.nanos != 0
    }

    /// The number of whole seconds that have passed since the beginning of time.
    pub fn secs(&self) -> u64 {
        self.nanos / 1_000_000_000
    }

    /// The fractional number of nanoseconds that have passed since the last full second.
    pub fn subsec_nanos(&self) -> u64 {
        self.nanos % 1_000_000_000
    }

    /// The total number of nanoseconds that have passed since the beginning of time.
    pub fn total_nanos(&self) -> u64 {
        self.nanos
    }
}

impl From<::std::time::SystemTime> for Instant {
    fn from(other: ::std::time::SystemTime) -> Instant {
        // A clock before the epoch is not a valid timestamp source, report it as unset.
        let n = other.duration_since(::std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_nanos(n.as_secs() * 1_000_000_000 + u64::from(n.subsec_nanos()))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:09}s", self.secs(), self.subsec_nanos())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_nanos(self.nanos + rhs.as_nanos() as u64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(rhs.nanos))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_instant_ops() {
        assert_eq!(Instant::from_nanos(4u64) + Duration::from_nanos(6), Instant::from_nanos(10u64));
        assert_eq!(Instant::from_millis(7u64) - Instant::from_millis(5u64), Duration::from_millis(2));
        // Clocks of different hosts may run backwards relative to each other.
        assert_eq!(Instant::from_millis(5u64) - Instant::from_millis(7u64), Duration::from_nanos(0));
    }

    #[test]
    fn test_instant_getters() {
        let instant = Instant::from_nanos(5_000_000_674u64);
        assert_eq!(instant.secs(), 5);
        assert_eq!(instant.subsec_nanos(), 674);
        assert_eq!(instant.total_nanos(), 5_000_000_674);
        assert!(!Instant::UNSET.is_set());
    }

    #[test]
    fn test_instant_display() {
        assert_eq!(format!("{}", Instant::from_millis(5674u64)), "5.674000000s");
    }

    #[test]
    fn test_instant_conversions() {
        assert_eq!(Instant::from(::std::time::UNIX_EPOCH), Instant::UNSET);
        let later = ::std::time::UNIX_EPOCH + ::std::time::Duration::from_secs(2085955200);
        assert_eq!(Instant::from(later).secs(), 2085955200);
    }
}
