use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT};

/// Readiness a descriptor asks for, or was reported to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);

    pub const READABLE: Interest = Interest(0b0001);

    pub const WRITABLE: Interest = Interest(0b0010);

    pub const BOTH: Interest = Interest(0b0011);

    pub fn is_readable(self) -> bool {
        (self.0 & Self::READABLE.0) != 0
    }

    pub fn is_writable(self) -> bool {
        (self.0 & Self::WRITABLE.0) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bits to put in `pollfd.events`.
    pub(crate) fn to_poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.is_readable() {
            events |= POLLIN;
        }
        if self.is_writable() {
            events |= POLLOUT;
        }
        events
    }

    /// Interprets `pollfd.revents`.
    ///
    /// Hang-up and error conditions count as readable: the next read then
    /// reports the close or the error and the connection is retired.
    pub(crate) fn from_poll_revents(revents: libc::c_short) -> Interest {
        let mut interest = Interest::NONE;
        if revents & (POLLIN | POLLHUP | POLLERR | POLLNVAL) != 0 {
            interest = interest | Interest::READABLE;
        }
        if revents & POLLOUT != 0 {
            interest = interest | Interest::WRITABLE;
        }
        interest
    }
}

impl std::ops::BitOr for Interest {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        Interest(self.0 | other.0)
    }
}

impl std::ops::BitAnd for Interest {
    type Output = Self;

    fn bitand(self, other: Self) -> Self {
        Interest(self.0 & other.0)
    }
}
