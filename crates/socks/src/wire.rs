//! RFC 1928 wire format: greeting, request, reply, and the §7 UDP
//! datagram header, as pure parse/encode functions.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;

pub const VERSION: u8 = 0x05;

pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_NO_ACCEPTABLE: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_BIND: u8 = 0x02;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

pub const REP_SUCCESS: u8 = 0x00;
pub const REP_GENERAL_FAILURE: u8 = 0x01;
pub const REP_NOT_ALLOWED: u8 = 0x02;
pub const REP_NETWORK_UNREACHABLE: u8 = 0x03;
pub const REP_HOST_UNREACHABLE: u8 = 0x04;
pub const REP_CONNECTION_REFUSED: u8 = 0x05;
pub const REP_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const REP_ADDRESS_NOT_SUPPORTED: u8 = 0x08;

/// Wire-level protocol violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unsupported protocol version {0:#04x}")]
    BadVersion(u8),
    #[error("unsupported address type {0:#04x}")]
    BadAddressType(u8),
    #[error("truncated message")]
    Truncated,
    #[error("fragmented UDP datagram (FRAG={0})")]
    Fragmented(u8),
    #[error("domain name is not valid UTF-8")]
    BadDomain,
}

/// A DST/BND address in any of the three ATYP encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

impl Address {
    /// Host portion as a dialable string.
    pub fn host(&self) -> String {
        match self {
            Address::Ipv4(ip) => ip.to_string(),
            Address::Domain(name) => name.clone(),
            Address::Ipv6(ip) => ip.to_string(),
        }
    }

    pub fn from_ip(ip: IpAddr) -> Address {
        match ip {
            IpAddr::V4(v4) => Address::Ipv4(v4),
            IpAddr::V6(v6) => Address::Ipv6(v6),
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Address::Ipv4(ip) => {
                out.push(ATYP_IPV4);
                out.extend_from_slice(&ip.octets());
            }
            Address::Domain(name) => {
                out.push(ATYP_DOMAIN);
                out.push(name.len().min(255) as u8);
                out.extend_from_slice(&name.as_bytes()[..name.len().min(255)]);
            }
            Address::Ipv6(ip) => {
                out.push(ATYP_IPV6);
                out.extend_from_slice(&ip.octets());
            }
        }
    }
}

/// Decode an ATYP + ADDR + PORT sequence. Returns the address, port, and
/// bytes consumed.
pub fn decode_address(buf: &[u8]) -> Result<(Address, u16, usize), WireError> {
    let atyp = *buf.first().ok_or(WireError::Truncated)?;
    let (address, addr_len) = match atyp {
        ATYP_IPV4 => {
            let octets: [u8; 4] = buf
                .get(1..5)
                .ok_or(WireError::Truncated)?
                .try_into()
                .expect("slice length checked");
            (Address::Ipv4(Ipv4Addr::from(octets)), 4)
        }
        ATYP_IPV6 => {
            let octets: [u8; 16] = buf
                .get(1..17)
                .ok_or(WireError::Truncated)?
                .try_into()
                .expect("slice length checked");
            (Address::Ipv6(Ipv6Addr::from(octets)), 16)
        }
        ATYP_DOMAIN => {
            let len = *buf.get(1).ok_or(WireError::Truncated)? as usize;
            let raw = buf.get(2..2 + len).ok_or(WireError::Truncated)?;
            let name = std::str::from_utf8(raw).map_err(|_| WireError::BadDomain)?;
            (Address::Domain(name.to_string()), 1 + len)
        }
        other => return Err(WireError::BadAddressType(other)),
    };
    let port_at = 1 + addr_len;
    let port_bytes = buf.get(port_at..port_at + 2).ok_or(WireError::Truncated)?;
    let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
    Ok((address, port, port_at + 2))
}

/// Encode a server reply: VER REP RSV ATYP BND.ADDR BND.PORT.
pub fn encode_reply(rep: u8, bound: SocketAddr) -> Vec<u8> {
    let mut out = vec![VERSION, rep, 0x00];
    Address::from_ip(bound.ip()).encode_into(&mut out);
    out.extend_from_slice(&bound.port().to_be_bytes());
    out
}

/// A parsed RFC 1928 §7 UDP request/response datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram<'a> {
    pub address: Address,
    pub port: u16,
    pub payload: &'a [u8],
}

/// Parse a client UDP datagram header. FRAG must be zero.
pub fn parse_udp_datagram(buf: &[u8]) -> Result<UdpDatagram<'_>, WireError> {
    if buf.len() < 4 {
        return Err(WireError::Truncated);
    }
    // RSV RSV FRAG
    let frag = buf[2];
    if frag != 0 {
        return Err(WireError::Fragmented(frag));
    }
    let (address, port, consumed) = decode_address(&buf[3..])?;
    Ok(UdpDatagram {
        address,
        port,
        payload: &buf[3 + consumed..],
    })
}

/// Build a UDP response datagram wrapping `payload` from `source`.
pub fn build_udp_datagram(source: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x00, 0x00, 0x00];
    Address::from_ip(source.ip()).encode_into(&mut out);
    out.extend_from_slice(&source.port().to_be_bytes());
    out.extend_from_slice(payload);
    out
}
