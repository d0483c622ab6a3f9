//! Protocol dissectors: raw Ethernet bytes -> `PacketInfo`.
//!
//! The chain is Ethernet -> IP (IPv4 only) -> {TCP, UDP, ICMP, other}. Every
//! dissector is a free function taking the remaining slice; malformed input
//! (truncated, bad header length, unsupported ether-type) is dropped
//! silently — the chain never panics and never reads past the slice it was
//! given. Generalized from a simpler "extract protocol + ports" dissector
//! into populating the full `PacketInfo` the trigger engine needs, with
//! field semantics (network byte order, IHL-derived header length, TCP
//! flag byte capture) following the `dissect_ethernet` / `dissect_ip` /
//! `dissect_tcp` / `dissect_udp` / `dissect_icmp` chain this crate grew up
//! from.

use std::net::Ipv4Addr;
use std::time::SystemTime;

/// IPv4-in-Ethernet marker, host-order after reading the wire bytes `08 00`
/// big-endian (spec.md's "`ether_type == 0x0008`" check compares the raw
/// u16 without byte-swapping, which is equivalent on a little-endian host;
/// this dissector swaps explicitly via `from_be_bytes` instead).
pub mod ether_type {
    pub const IPV4: u16 = 0x0800;
}

/// TCP flag byte values relevant to `tcp-syn` triggers.
pub mod tcp_flags {
    pub const SYN: u8 = 0x02;
}

/// IP protocol numbers the dissector chain recognizes.
pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

const ETHERNET_HEADER_LEN: usize = 14;
const MIN_IP_HEADER_LEN: usize = 20;

/// A transient per-packet descriptor, populated by the dissector chain and
/// consumed by the flow cache, IP-state table, and trigger engine. Cheap to
/// copy: no heap allocation, so it can be embedded in a `BanRecord` by value
/// without an allocation on the hot path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketInfo {
    /// Capture timestamp.
    pub ts: SystemTime,
    /// Total bytes on the wire.
    pub len: u64,
    /// Packet count represented by this `PacketInfo` (1 for live capture;
    /// may exceed 1 for aggregated replay, see `source::ReplaySource`).
    pub packets: u64,
    /// Raw Ethernet type field as read off the wire (host order).
    pub ether_type: u16,
    /// IPv4 source address. `Ipv4Addr::UNSPECIFIED` until the IP dissector runs.
    pub pkt_src: Ipv4Addr,
    /// IPv4 destination address. `Ipv4Addr::UNSPECIFIED` until the IP dissector runs.
    pub pkt_dst: Ipv4Addr,
    /// IP protocol number (6 = TCP, 17 = UDP, 1 = ICMP, ...).
    pub ip_type: u8,
    /// TCP/UDP source port (0 for ICMP and unknown protocols).
    pub src_port: u16,
    /// TCP/UDP destination port (0 for ICMP and unknown protocols).
    pub dst_port: u16,
    /// TCP flag byte (0 for non-TCP packets).
    pub tcp_flags: u8,
    /// Set by the flow cache: true exactly on the first `inject` of a flow.
    pub new_flow: bool,
}

impl PacketInfo {
    /// A zeroed `PacketInfo` stamped with `ts`/`len`/`packets`, ready for the
    /// dissector chain to populate.
    pub fn new(ts: SystemTime, len: u64, packets: u64) -> Self {
        Self {
            ts,
            len,
            packets,
            ether_type: 0,
            pkt_src: Ipv4Addr::UNSPECIFIED,
            pkt_dst: Ipv4Addr::UNSPECIFIED,
            ip_type: 0,
            src_port: 0,
            dst_port: 0,
            tcp_flags: 0,
            new_flow: false,
        }
    }
}

/// Dissect a raw Ethernet frame into `info`, dispatching into the IP
/// dissector for IPv4 frames. Non-IPv4 frames leave `info`'s IP fields
/// zeroed and the caller (the flow cache's `inject` is never invoked for
/// them) drops the frame from further processing.
///
/// Returns `false` if the frame was too short to contain an Ethernet
/// header or was not IPv4 — callers should not forward such packets past
/// dissection.
pub fn dissect_ethernet(info: &mut PacketInfo, frame: &[u8]) -> bool {
    if frame.len() < ETHERNET_HEADER_LEN {
        return false;
    }

    let ether_type = u16::from_be_bytes([frame[12], frame[13]]);
    info.ether_type = ether_type;

    if ether_type != ether_type::IPV4 {
        return false;
    }

    dissect_ip(info, &frame[ETHERNET_HEADER_LEN..])
}

/// Dissect an IPv4 header, then dispatch to the transport dissector for the
/// protocol named in the header. Rejects headers shorter than 20 bytes or
/// frames truncated before the declared header length.
fn dissect_ip(info: &mut PacketInfo, data: &[u8]) -> bool {
    if data.len() < MIN_IP_HEADER_LEN {
        return false;
    }

    let version = data[0] >> 4;
    if version != 4 {
        return false;
    }

    let ihl = ((data[0] & 0x0F) as usize) * 4;
    if ihl < MIN_IP_HEADER_LEN || data.len() < ihl {
        return false;
    }

    info.pkt_src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    info.pkt_dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    info.ip_type = data[9];

    let payload = &data[ihl..];
    match info.ip_type {
        ip_proto::TCP => dissect_tcp(info, payload),
        ip_proto::UDP => dissect_udp(info, payload),
        ip_proto::ICMP => dissect_icmp(info, payload),
        _ => true, // unknown protocol still flows through to injection, ports stay zero
    }
}

fn dissect_tcp(info: &mut PacketInfo, data: &[u8]) -> bool {
    if data.len() < 14 {
        return false;
    }
    info.src_port = u16::from_be_bytes([data[0], data[1]]);
    info.dst_port = u16::from_be_bytes([data[2], data[3]]);
    info.tcp_flags = data[13];
    true
}

fn dissect_udp(info: &mut PacketInfo, data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    info.src_port = u16::from_be_bytes([data[0], data[1]]);
    info.dst_port = u16::from_be_bytes([data[2], data[3]]);
    true
}

fn dissect_icmp(_info: &mut PacketInfo, data: &[u8]) -> bool {
    // ICMP triggers injection with ports left zero; only presence matters.
    data.len() >= 4
}
