//! Portable signal codes for process control
//!
//! Warden exposes a small, portable subset of POSIX signals. Platform
//! backends map these to their native representation; platforms lacking a
//! given signal report an error at delivery time rather than at
//! construction time.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A portable process signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Signal {
    /// Hangup (SIGHUP)
    Hangup,
    /// Keyboard interrupt (SIGINT)
    Interrupt,
    /// Graceful termination request (SIGTERM)
    Terminate,
    /// Forceful, uncatchable termination (SIGKILL)
    Kill,
}

impl Signal {
    /// The conventional POSIX signal number.
    #[must_use]
    pub const fn number(&self) -> i32 {
        match self {
            Self::Hangup => 1,
            Self::Interrupt => 2,
            Self::Kill => 9,
            Self::Terminate => 15,
        }
    }

    /// The conventional POSIX signal name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hangup => "SIGHUP",
            Self::Interrupt => "SIGINT",
            Self::Kill => "SIGKILL",
            Self::Terminate => "SIGTERM",
        }
    }

    /// Parses a portable signal from a POSIX signal number.
    ///
    /// Returns `None` for numbers outside the portable subset.
    #[must_use]
    pub const fn from_number(number: i32) -> Option<Self> {
        match number {
            1 => Some(Self::Hangup),
            2 => Some(Self::Interrupt),
            9 => Some(Self::Kill),
            15 => Some(Self::Terminate),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_numbers_match_posix() {
        assert_eq!(Signal::Hangup.number(), 1);
        assert_eq!(Signal::Interrupt.number(), 2);
        assert_eq!(Signal::Kill.number(), 9);
        assert_eq!(Signal::Terminate.number(), 15);
    }

    #[test]
    fn test_from_number_roundtrip() {
        for sig in [
            Signal::Hangup,
            Signal::Interrupt,
            Signal::Kill,
            Signal::Terminate,
        ] {
            assert_eq!(Signal::from_number(sig.number()), Some(sig));
        }
        assert_eq!(Signal::from_number(0), None);
        assert_eq!(Signal::from_number(64), None);
    }

    #[test]
    fn test_display_uses_posix_name() {
        assert_eq!(Signal::Kill.to_string(), "SIGKILL");
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
    }
}
