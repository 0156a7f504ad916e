//! Conversions between [`SocketAddr`] and the raw `sockaddr` structures libc expects.

use libc::{AF_INET, AF_INET6, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t};
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Returns the address family to pass to `socket(2)` for `address`.
pub(crate) fn domain_of(address: &SocketAddr) -> libc::c_int {
    match address {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    }
}

/// Encodes `address` into a `sockaddr_storage` and the length to hand to the kernel.
pub(crate) fn socketaddr_to_sockaddr(address: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let length = match address {
        SocketAddr::V4(v4) => {
            let raw = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            raw.sin_family = AF_INET as libc::sa_family_t;
            raw.sin_port = v4.port().to_be();
            raw.sin_addr = libc::in_addr {
                s_addr: u32::from_ne_bytes(v4.ip().octets()),
            };
            mem::size_of::<sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let raw = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            raw.sin6_family = AF_INET6 as libc::sa_family_t;
            raw.sin6_port = v6.port().to_be();
            raw.sin6_flowinfo = v6.flowinfo();
            raw.sin6_addr = libc::in6_addr {
                s6_addr: v6.ip().octets(),
            };
            raw.sin6_scope_id = v6.scope_id();
            mem::size_of::<sockaddr_in6>()
        }
    };

    (storage, length as socklen_t)
}

/// Decodes a kernel-filled `sockaddr_storage`. Returns `None` for families
/// other than IPv4 and IPv6.
pub(crate) fn sockaddr_to_socketaddr(storage: &sockaddr_storage) -> Option<SocketAddr> {
    match storage.ss_family as libc::c_int {
        AF_INET => {
            let raw = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes());
            Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(raw.sin_port))))
        }
        AF_INET6 => {
            let raw = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(raw.sin6_addr.s6_addr);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(raw.sin6_port),
                raw.sin6_flowinfo,
                raw.sin6_scope_id,
            )))
        }
        _ => None,
    }
}
