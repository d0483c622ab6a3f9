//! Per-5-tuple flow deduplication and first-packet detection.
//!
//! The upstream capture path indexes flows hierarchically (destination
//! host -> source host -> port-pair record) to keep the lookup cheap when
//! most traffic shares a handful of destinations. The externally observable
//! contract is just key equality on the full 5-tuple, so this keeps a flat
//! map keyed on the tuple directly; the hierarchy was an indexing choice,
//! not part of the contract.

use std::net::Ipv4Addr;

use dashmap::DashMap;

use crate::ipstate::{IPRecord, IpStateTable};
use crate::packet::PacketInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FlowKey {
    dst: Ipv4Addr,
    src: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    proto: u8,
}

impl FlowKey {
    fn from_packet(packet: &PacketInfo) -> Self {
        FlowKey {
            dst: packet.pkt_dst,
            src: packet.pkt_src,
            src_port: packet.src_port,
            dst_port: packet.dst_port,
            proto: packet.ip_type,
        }
    }
}

/// One entry per (dst, src, src-port, dst-port, protocol) flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowRecord {
    pub bytes: u64,
    pub packets: u64,
    injected: bool,
}

/// Keyed store of active flows, deduplicating repeat packets of the same
/// 5-tuple and flagging the first packet of each new one.
#[derive(Debug, Default)]
pub struct FlowCache {
    table: DashMap<FlowKey, FlowRecord>,
}

impl FlowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing record for `packet`'s 5-tuple, creating one if
    /// absent.
    pub fn lookup_or_insert(&self, packet: &PacketInfo) -> FlowRecord {
        *self.table.entry(FlowKey::from_packet(packet)).or_default()
    }

    /// Accumulates `packet` into its flow record, marks `packet.new_flow`
    /// on first sight, and forwards the update to `ip_state`.
    ///
    /// Returns the `IPRecord` snapshot produced by the IP-state update, for
    /// the caller to hand to the trigger engine.
    pub fn inject(&self, packet: &mut PacketInfo, ip_state: &IpStateTable) -> IPRecord {
        let key = FlowKey::from_packet(packet);
        let mut entry = self.table.entry(key).or_default();

        entry.bytes += packet.len;
        entry.packets += packet.packets;
        packet.new_flow = !entry.injected;

        drop(entry);
        let iprecord = ip_state.update(packet);

        self.table.entry(key).and_modify(|r| r.injected = true);

        iprecord
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
