//! Scoped multicast sockets and destination-aware datagram reads.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::NetConfig;

/// Largest UDP payload.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Pause between joins so the network stack is not flooded with IGMP reports.
const JOIN_PACING: Duration = Duration::from_millis(1);

/// A bound UDP socket together with the groups it joined.
///
/// Every joined group is left exactly once when this is dropped, after
/// which the socket closes. The socket only receives datagrams for the
/// groups it joined itself.
pub struct MulticastSocket {
    socket: UdpSocket,
    interface: Ipv4Addr,
    groups: Vec<Ipv4Addr>,
    device: Option<usize>,
}

impl MulticastSocket {
    /// Create, configure and bind a non-blocking socket on the configured
    /// port. `device` tags sockets that only ever carry one device.
    pub fn bind(config: &NetConfig, device: Option<usize>) -> Result<Self, String> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| format!("Socket creation failed: {}", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| format!("Failed to set SO_REUSEADDR: {}", e))?;
        // Linux otherwise delivers every group joined on the host to every
        // socket on the port.
        #[cfg(target_os = "linux")]
        socket
            .set_multicast_all_v4(false)
            .map_err(|e| format!("Failed to clear IP_MULTICAST_ALL: {}", e))?;
        if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_size) {
            log::warn!("Failed to set receive buffer to {} bytes: {}", config.recv_buffer_size, e);
        }

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        socket
            .bind(&addr.into())
            .map_err(|e| format!("Bind failed on port {}: {}", config.port, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| format!("Failed to make socket non-blocking: {}", e))?;

        let socket: UdpSocket = socket.into();
        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
        enable_packet_info(&socket)?;

        Ok(Self {
            socket,
            interface: config.bind_addr,
            groups: Vec::new(),
            device,
        })
    }

    pub fn join(&mut self, group: Ipv4Addr) -> io::Result<()> {
        self.socket.join_multicast_v4(&group, &self.interface)?;
        self.groups.push(group);
        Ok(())
    }

    pub fn joined_groups(&self) -> &[Ipv4Addr] {
        &self.groups
    }

    /// Fixed device for `PerDevice` sockets, `None` for the shared socket.
    pub fn device(&self) -> Option<usize> {
        self.device
    }

    /// Async handle sharing the same underlying socket and memberships.
    /// Must be called from inside a tokio runtime.
    pub fn to_async(&self) -> io::Result<tokio::net::UdpSocket> {
        tokio::net::UdpSocket::from_std(self.socket.try_clone()?)
    }
}

impl Drop for MulticastSocket {
    fn drop(&mut self) {
        for group in self.groups.drain(..) {
            if let Err(e) = self.socket.leave_multicast_v4(&group, &self.interface) {
                log::debug!("Failed to leave multicast group {}: {}", group, e);
            }
        }
    }
}

/// Bind as many sockets as `groups` need, each holding at most
/// `config.max_memberships` groups. Hosts cap memberships per socket
/// (`igmp_max_memberships` on Linux), so a refused join is retried once on
/// a fresh socket before the group is skipped. Sockets that joined nothing
/// are dropped.
pub fn bind_group_sockets(
    config: &NetConfig,
    device: Option<usize>,
    groups: impl IntoIterator<Item = (u8, Ipv4Addr)>,
) -> Result<Vec<MulticastSocket>, String> {
    let limit = config.max_memberships.max(1);
    let mut sockets = Vec::new();
    let mut current: Option<MulticastSocket> = None;

    for (subnet, group) in groups {
        let mut socket = match current.take() {
            Some(socket) if socket.groups.len() < limit => socket,
            Some(full) => {
                sockets.push(full);
                MulticastSocket::bind(config, device)?
            }
            None => MulticastSocket::bind(config, device)?,
        };

        if let Err(e) = socket.join(group) {
            if socket.groups.is_empty() {
                log::warn!("Failed to join multicast group {}: {}", group, e);
            } else {
                log::debug!("Socket full after {} groups: {}", socket.groups.len(), e);
                sockets.push(socket);
                socket = MulticastSocket::bind(config, device)?;
                if let Err(e) = socket.join(group) {
                    log::warn!("Failed to join multicast group {}: {}", group, e);
                }
            }
        }

        if subnet % 2 == 0 {
            thread::sleep(JOIN_PACING);
        }
        current = Some(socket);
    }

    sockets.extend(current);
    sockets.retain(|s| !s.groups.is_empty());
    Ok(sockets)
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
fn enable_packet_info(socket: &UdpSocket) -> Result<(), String> {
    use nix::sys::socket::{setsockopt, sockopt};

    setsockopt(socket, sockopt::Ipv4PacketInfo, &true).map_err(|e| format!("Failed to set IP_PKTINFO: {}", e))
}

/// Reusable receive buffers for one receive loop.
pub(crate) struct DatagramReader {
    buf: Vec<u8>,
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
    cmsg: Vec<u8>,
}

impl DatagramReader {
    pub fn new() -> Self {
        Self {
            buf: vec![0; MAX_DATAGRAM_SIZE],
            #[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
            cmsg: nix::cmsg_space!(nix::libc::in_pktinfo),
        }
    }

    /// Read one datagram. Returns its length and, where the platform
    /// reports it, the destination address it was sent to.
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
    pub fn recv(&mut self, socket: &tokio::net::UdpSocket) -> io::Result<(usize, Option<Ipv4Addr>)> {
        use std::os::fd::AsRawFd;
        use tokio::io::Interest;

        let Self { buf, cmsg } = self;
        socket.try_io(Interest::READABLE, || recv_with_packet_info(socket.as_raw_fd(), buf, cmsg))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios")))]
    pub fn recv(&mut self, socket: &tokio::net::UdpSocket) -> io::Result<(usize, Option<Ipv4Addr>)> {
        socket.try_recv(&mut self.buf).map(|len| (len, None))
    }

    pub fn payload(&self, len: usize) -> &[u8] {
        &self.buf[..len]
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
fn recv_with_packet_info(
    fd: std::os::fd::RawFd,
    buf: &mut [u8],
    cmsg: &mut Vec<u8>,
) -> io::Result<(usize, Option<Ipv4Addr>)> {
    use std::io::IoSliceMut;

    use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags, SockaddrIn};

    let mut iov = [IoSliceMut::new(buf)];
    let msg = recvmsg::<SockaddrIn>(fd, &mut iov, Some(cmsg), MsgFlags::empty())?;

    let mut destination = None;
    for control in msg.cmsgs()? {
        if let ControlMessageOwned::Ipv4PacketInfo(info) = control {
            destination = Some(Ipv4Addr::from(u32::from_be(info.ipi_addr.s_addr)));
        }
    }
    Ok((msg.bytes, destination))
}
