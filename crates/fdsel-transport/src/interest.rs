use std::{fmt, ops};

const READ: u8 = 0b0001;
const WRITE: u8 = 0b0010;
const CONNECT: u8 = 0b0100;
const ACCEPT: u8 = 0b1000;
const ALL: u8 = READ | WRITE | CONNECT | ACCEPT;

/// A set of readiness flags.
///
/// The same type describes what a handle is interested in and what the
/// selector last observed for it.
///
/// `CONNECT` is resolved by the OS write readiness and `ACCEPT` by the OS read
/// readiness. The bits stay distinct so the caller can tell a finished
/// connect from an ordinary writable stream; which one applies is decided by
/// the endpoint's role, not by the OS.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    /// Data can be read without blocking.
    pub const READ: Interest = Interest(READ);
    /// Data can be written without blocking.
    pub const WRITE: Interest = Interest(WRITE);
    /// A pending connect has resolved (successfully or not).
    pub const CONNECT: Interest = Interest(CONNECT);
    /// A listening socket has a connection waiting to be accepted.
    pub const ACCEPT: Interest = Interest(ACCEPT);

    /// The empty set.
    pub const fn empty() -> Interest {
        Interest(0)
    }

    /// Every flag.
    pub const fn all() -> Interest {
        Interest(ALL)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every flag of `other` is set in `self`.
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if `self` and `other` share at least one flag.
    pub const fn intersects(self, other: Interest) -> bool {
        self.0 & other.0 != 0
    }

    /// Flags that map onto OS read readiness (`READ`, `ACCEPT`).
    pub const fn read_side(self) -> Interest {
        Interest(self.0 & (READ | ACCEPT))
    }

    /// Flags that map onto OS write readiness (`WRITE`, `CONNECT`).
    pub const fn write_side(self) -> Interest {
        Interest(self.0 & (WRITE | CONNECT))
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds a set from raw bits, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u8) -> Interest {
        Interest(bits & ALL)
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;

    #[inline]
    fn bitor(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }
}

impl ops::BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, other: Interest) {
        self.0 |= other.0;
    }
}

impl ops::BitAnd for Interest {
    type Output = Interest;

    #[inline]
    fn bitand(self, other: Interest) -> Interest {
        Interest(self.0 & other.0)
    }
}

impl ops::Sub for Interest {
    type Output = Interest;

    #[inline]
    fn sub(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (Interest::READ, "READ"),
            (Interest::WRITE, "WRITE"),
            (Interest::CONNECT, "CONNECT"),
            (Interest::ACCEPT, "ACCEPT"),
        ];

        let mut one = false;
        for (flag, name) in flags {
            if self.contains(flag) {
                if one {
                    write!(fmt, " | ")?;
                }
                write!(fmt, "{name}")?;
                one = true;
            }
        }

        if !one {
            fmt.write_str("(empty)")?;
        }

        Ok(())
    }
}
