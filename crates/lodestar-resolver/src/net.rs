//! UDP plumbing for talking to upstream nameservers and to clients.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use lodestar_wire::protocol::types::Message;

/// Budget for opening an upstream datagram endpoint.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Budget for one reply datagram from an upstream.
pub const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// The usual limit on un-negotiated DNS-over-UDP payloads.
pub const MAX_UDP_PAYLOAD: usize = 512;

/// Send one request to a nameserver and await one reply.
///
/// A reply whose first two octets do not echo the request's
/// transaction id is discarded.  Timeouts, I/O errors, id mismatches,
/// and unparseable replies all come back as `None`: the caller's move
/// is the next candidate, whatever went wrong with this one.
pub(crate) async fn exchange(address: SocketAddr, request: &[u8]) -> Option<Message> {
    let local: SocketAddr = if address.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let sock = UdpSocket::bind(local).await.ok()?;
    match timeout(CONNECT_TIMEOUT, sock.connect(address)).await {
        Ok(Ok(())) => (),
        Ok(Err(error)) => {
            tracing::debug!(%address, ?error, "could not connect to nameserver");
            return None;
        }
        Err(_) => {
            tracing::debug!(%address, "timed out connecting to nameserver");
            return None;
        }
    }

    sock.send(request).await.ok()?;

    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
    let len = match timeout(READ_TIMEOUT, sock.recv(&mut buf)).await {
        Ok(Ok(len)) => len,
        Ok(Err(error)) => {
            tracing::debug!(%address, ?error, "error receiving from nameserver");
            return None;
        }
        Err(_) => {
            tracing::debug!(%address, "timed out waiting for nameserver");
            return None;
        }
    };

    let reply = &buf[..len];
    if reply.len() < 2 || reply[0..2] != request[0..2] {
        tracing::debug!(%address, "transaction id mismatch");
        return None;
    }

    Message::from_octets(reply).ok()
}

/// Write a serialised message to a UDP socket, bound for `target`.
/// Messages too big for a datagram are cut down to fit, with the TC
/// flag set.
pub async fn send_udp_bytes_to(
    sock: &UdpSocket,
    target: SocketAddr,
    bytes: &mut [u8],
) -> Result<(), io::Error> {
    if bytes.len() < 12 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "message too short to hold a header",
        ));
    }

    if bytes.len() > MAX_UDP_PAYLOAD {
        bytes[2] |= 0b0000_0010;
        sock.send_to(&bytes[..MAX_UDP_PAYLOAD], target).await?;
    } else {
        bytes[2] &= 0b1111_1101;
        sock.send_to(bytes, target).await?;
    }

    Ok(())
}
