//! Ordered set of watched descriptors.
//!
//! Index 0 always holds the listening descriptor; clients follow in the
//! order they were accepted. The `pollfd` array is kept contiguous so it can
//! be handed to `poll(2)` as is, with a parallel vector of [`Entry`] values
//! that own the client streams.
//!
//! # Removal while iterating
//!
//! [`Registry::remove_at`] shifts every later entry down by one. A caller
//! walking the registry forward must therefore not advance its index after
//! a removal: the next entry has moved into the slot it is looking at.
//!
//! ```ignore
//! let mut index = registry.first_client();
//! while index < registry.len() {
//!     if should_close(index) {
//!         registry.remove_at(index);
//!         continue;
//!     }
//!     index += 1;
//! }
//! ```

use crate::error::{Result, ServerError};
use crate::net::tcp_stream::TcpStream;
use crate::reactor::interest::Interest;
use crate::reactor::io::{Closed, Connection, ConnectionState};

use libc::{POLLERR, POLLNVAL, pollfd};
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};

const LISTENER_INDEX: usize = 0;

#[derive(Debug)]
pub(crate) enum Entry {
    Listener,
    Client(Connection),
}

/// Snapshot of one registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watched {
    pub fd: RawFd,
    /// What the loop asked to be told about.
    pub interest: Interest,
    /// What the last wait reported.
    pub observed: Interest,
}

#[derive(Debug)]
pub struct Registry {
    fds: Vec<pollfd>,
    entries: Vec<Entry>,
}

impl Registry {
    /// Creates a registry watching `listener` for readability at index 0.
    ///
    /// The registry does not own the listening descriptor; the event loop does.
    pub fn new(listener: RawFd) -> Self {
        Self {
            fds: vec![pollfd {
                fd: listener,
                events: Interest::READABLE.to_poll_events(),
                revents: 0,
            }],
            entries: vec![Entry::Listener],
        }
    }

    pub fn listener_index(&self) -> usize {
        LISTENER_INDEX
    }

    pub fn first_client(&self) -> usize {
        LISTENER_INDEX + 1
    }

    /// Number of watched descriptors, listener included.
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// True when only the listener is watched.
    pub fn is_empty(&self) -> bool {
        self.client_count() == 0
    }

    pub fn client_count(&self) -> usize {
        self.fds.len() - 1
    }

    pub fn at(&self, index: usize) -> Option<Watched> {
        self.fds.get(index).map(|entry| Watched {
            fd: entry.fd,
            interest: Interest::from_poll_revents(entry.events),
            observed: Interest::from_poll_revents(entry.revents),
        })
    }

    pub fn observed(&self, index: usize) -> Interest {
        self.fds
            .get(index)
            .map(|entry| Interest::from_poll_revents(entry.revents))
            .unwrap_or(Interest::NONE)
    }

    /// True when the last wait reported `POLLERR` or `POLLNVAL` on the
    /// listener. Unlike a client, the listener cannot be retired.
    pub fn listener_failed(&self) -> bool {
        self.fds[LISTENER_INDEX].revents & (POLLERR | POLLNVAL) != 0
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.fds.iter().any(|entry| entry.fd == fd)
    }

    /// Descriptors of every tracked client, in registry order.
    pub fn client_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.fds[self.first_client()..].iter().map(|entry| entry.fd)
    }

    /// Starts watching a freshly accepted client.
    ///
    /// The new entry goes to the end with no observed readiness, so a
    /// forward walk in progress reaches it without acting on it.
    ///
    /// # Returns
    /// The index of the new entry, or [`ServerError::DuplicateDescriptor`]
    /// when the descriptor is already tracked. In that case the tracked
    /// entry stays the sole owner and the handle passed in is not closed.
    pub fn add(&mut self, stream: TcpStream, peer: SocketAddr, interest: Interest) -> Result<usize> {
        let fd = stream.as_raw_fd();
        if self.contains(fd) {
            std::mem::forget(stream);
            return Err(ServerError::DuplicateDescriptor { fd });
        }

        let mut connection = Connection::new(stream, peer);
        connection.state = ConnectionState::AwaitingRead;

        self.fds.push(pollfd {
            fd,
            events: interest.to_poll_events(),
            revents: 0,
        });
        self.entries.push(Entry::Client(connection));

        Ok(self.fds.len() - 1)
    }

    /// Stops watching the client at `index` and releases its descriptor.
    ///
    /// Later entries shift down by one. The listener cannot be removed;
    /// asking for index 0 or an index past the end returns `None`.
    pub fn remove_at(&mut self, index: usize) -> Option<Closed> {
        if index == LISTENER_INDEX || index >= self.entries.len() {
            return None;
        }

        self.fds.remove(index);
        match self.entries.remove(index) {
            Entry::Client(connection) => Some(connection.close()),
            Entry::Listener => None,
        }
    }

    pub fn connection(&self, index: usize) -> Option<&Connection> {
        match self.entries.get(index) {
            Some(Entry::Client(connection)) => Some(connection),
            _ => None,
        }
    }

    pub(crate) fn connection_mut(&mut self, index: usize) -> Option<&mut Connection> {
        match self.entries.get_mut(index) {
            Some(Entry::Client(connection)) => Some(connection),
            _ => None,
        }
    }

    pub fn set_interest(&mut self, index: usize, interest: Interest) {
        if let Some(entry) = self.fds.get_mut(index) {
            entry.events = interest.to_poll_events();
        }
    }

    /// Forgets the readiness reported by the previous wait.
    pub fn clear_observed(&mut self) {
        for entry in &mut self.fds {
            entry.revents = 0;
        }
    }

    /// Releases every client. The listener entry stays.
    pub fn clear(&mut self) -> Vec<Closed> {
        self.fds.truncate(self.first_client());
        self.entries
            .drain(LISTENER_INDEX + 1..)
            .filter_map(|entry| match entry {
                Entry::Client(connection) => Some(connection.close()),
                Entry::Listener => None,
            })
            .collect()
    }

    pub(crate) fn poll_fds_mut(&mut self) -> &mut [pollfd] {
        &mut self.fds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::net::socket::Socket;
    use crate::net::tcp_stream::tests::stream_pair;
    use crate::net::tcp_stream::{Read, Write};
    use libc::{POLLIN, POLLOUT};

    const LISTENER_FD: RawFd = 1_000_000;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    /// Adds `count` clients and returns the far ends of their socket pairs.
    fn populate(registry: &mut Registry, count: usize) -> Vec<TcpStream> {
        (0..count)
            .map(|_| {
                let (near, far) = stream_pair();
                registry.add(near, peer(), Interest::READABLE).unwrap();
                far
            })
            .collect()
    }

    #[test]
    fn listener_sits_at_index_zero() {
        let registry = Registry::new(LISTENER_FD);

        assert_eq!(registry.listener_index(), 0);
        assert_eq!(registry.len(), 1);
        assert!(registry.is_empty());
        assert_eq!(
            registry.at(0),
            Some(Watched {
                fd: LISTENER_FD,
                interest: Interest::READABLE,
                observed: Interest::NONE,
            })
        );
    }

    #[test]
    fn listener_is_never_removed() {
        let mut registry = Registry::new(LISTENER_FD);
        let _far = populate(&mut registry, 1);

        assert_eq!(registry.remove_at(0), None);
        assert_eq!(registry.remove_at(5), None);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(LISTENER_FD));
    }

    #[test]
    fn clients_keep_arrival_order() {
        let mut registry = Registry::new(LISTENER_FD);
        let (first, _a) = stream_pair();
        let (second, _b) = stream_pair();
        let first_fd = first.as_raw_fd();
        let second_fd = second.as_raw_fd();

        assert_eq!(registry.add(first, peer(), Interest::READABLE).unwrap(), 1);
        assert_eq!(registry.add(second, peer(), Interest::READABLE).unwrap(), 2);
        assert_eq!(registry.client_fds().collect::<Vec<_>>(), vec![first_fd, second_fd]);
        assert_eq!(
            registry.connection(1).unwrap().state(),
            ConnectionState::AwaitingRead
        );
    }

    #[test]
    fn duplicate_descriptor_is_rejected_without_closing() {
        let mut registry = Registry::new(LISTENER_FD);
        let (near, far) = stream_pair();
        let fd = near.as_raw_fd();
        registry.add(near, peer(), Interest::READABLE).unwrap();

        let alias = TcpStream::new(unsafe { Socket::from_raw(fd) });
        match registry.add(alias, peer(), Interest::READABLE) {
            Err(ServerError::DuplicateDescriptor { fd: rejected }) => assert_eq!(rejected, fd),
            other => panic!("expected duplicate rejection, got {other:?}"),
        }

        assert_eq!(registry.client_count(), 1);
        // The tracked stream still works.
        assert_eq!(far.write_all(b"x"), Ok(Write::Written(1)));
        let mut buf = [0u8; 4];
        let tracked = &registry.connection(1).unwrap().stream;
        assert_eq!(
            tracked.read_available(&mut buf),
            Ok(Read::Data {
                len: 1,
                more: false
            })
        );
    }

    #[test]
    fn remove_at_releases_and_shifts() {
        let mut registry = Registry::new(LISTENER_FD);
        let far = populate(&mut registry, 3);
        let fds: Vec<RawFd> = registry.client_fds().collect();

        let closed = registry.remove_at(2).expect("client removed");
        assert_eq!(closed.fd, fds[1]);
        assert_eq!(closed.last_state, ConnectionState::AwaitingRead);
        assert_eq!(registry.client_fds().collect::<Vec<_>>(), vec![fds[0], fds[2]]);

        // The released end now reads as closed from the other side.
        let mut buf = [0u8; 4];
        assert_eq!(far[1].read_available(&mut buf), Ok(Read::Closed));
        assert_eq!(far[0].read_available(&mut buf), Ok(Read::NoneAvailable));
    }

    #[test]
    fn removal_during_forward_walk_skips_nothing() {
        let mut registry = Registry::new(LISTENER_FD);
        let _far = populate(&mut registry, 6);
        let fds: Vec<RawFd> = registry.client_fds().collect();

        // Retire every even-positioned client, including adjacent pairs.
        let doomed = [fds[0], fds[1], fds[3], fds[5]];
        let mut visited = Vec::new();
        let mut index = registry.first_client();
        while index < registry.len() {
            let fd = registry.at(index).unwrap().fd;
            visited.push(fd);
            if doomed.contains(&fd) {
                registry.remove_at(index);
                continue;
            }
            index += 1;
        }

        assert_eq!(visited, fds);
        assert_eq!(registry.client_fds().collect::<Vec<_>>(), vec![fds[2], fds[4]]);
    }

    #[test]
    fn observed_reflects_revents_until_cleared() {
        let mut registry = Registry::new(LISTENER_FD);
        let _far = populate(&mut registry, 1);

        registry.poll_fds_mut()[1].revents = POLLIN | POLLOUT;
        assert_eq!(registry.observed(1), Interest::BOTH);
        assert_eq!(registry.observed(0), Interest::NONE);
        assert_eq!(registry.observed(9), Interest::NONE);

        registry.clear_observed();
        assert!(registry.observed(1).is_empty());
    }

    #[test]
    fn interest_can_be_switched_off() {
        let mut registry = Registry::new(LISTENER_FD);
        registry.set_interest(0, Interest::NONE);

        assert_eq!(registry.at(0).unwrap().interest, Interest::NONE);
        assert_eq!(registry.poll_fds_mut()[0].events, 0);
    }

    #[test]
    fn error_bits_on_listener_are_reported() {
        let mut registry = Registry::new(LISTENER_FD);
        assert!(!registry.listener_failed());

        registry.poll_fds_mut()[0].revents = POLLIN;
        assert!(!registry.listener_failed());

        registry.poll_fds_mut()[0].revents = POLLNVAL;
        assert!(registry.listener_failed());

        registry.clear_observed();
        assert!(!registry.listener_failed());
    }

    #[test]
    fn clear_releases_every_client() {
        let mut registry = Registry::new(LISTENER_FD);
        let far = populate(&mut registry, 3);

        let closed = registry.clear();
        assert_eq!(closed.len(), 3);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 1);

        let mut buf = [0u8; 4];
        for stream in &far {
            assert_eq!(stream.read_available(&mut buf), Ok(Read::Closed));
        }
    }
}
