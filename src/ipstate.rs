//! Per-source-IP, per-protocol traffic rate aggregation.
//!
//! Storage idiom: a `DashMap` keyed by the entity being tracked, updated
//! in place rather than read-modify-written through a `Mutex<HashMap<_>>`,
//! since updates are keyed purely by source IP with no cross-key invariant
//! to protect under one lock.

use std::collections::HashMap;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::packet::PacketInfo;
use crate::trigger::IpProtocol;

/// Window over which the rate estimator reports `flow`/`pps`.
pub const RATE_WINDOW_SECS: f64 = crate::config::RATE_WINDOW_SECS;

/// A windowed rate estimate for one (source IP, protocol) pair.
///
/// `flow` is bits-per-second-equivalent (divide by 1e6 for mbps); `pps`
/// is packets-per-second; `count` is the distinct flow count, incremented
/// once per `new_flow` packet.
#[derive(Debug, Clone, Default)]
pub struct FlowData {
    pub flow: f64,
    pub pps: f64,
    pub count: u32,
    window_start: Option<SystemTime>,
    window_bytes: u64,
    window_packets: u64,
}

impl FlowData {
    fn update(&mut self, ts: SystemTime, len: u64, packets: u64, new_flow: bool) {
        if new_flow {
            self.count += 1;
        }

        let window_start = *self.window_start.get_or_insert(ts);
        let elapsed = ts
            .duration_since(window_start)
            .unwrap_or_default()
            .as_secs_f64();

        self.window_bytes += len;
        self.window_packets += packets;

        if elapsed >= RATE_WINDOW_SECS {
            self.flow = (self.window_bytes as f64 * 8.0) / elapsed;
            self.pps = self.window_packets as f64 / elapsed;
            self.window_start = Some(ts);
            self.window_bytes = 0;
            self.window_packets = 0;
        } else if elapsed > 0.0 {
            self.flow = (self.window_bytes as f64 * 8.0) / elapsed;
            self.pps = self.window_packets as f64 / elapsed;
        }
    }
}

/// Aggregated per-source-IP state, partitioned by IP protocol.
#[derive(Debug, Clone, Default)]
pub struct IPRecord {
    protocols: HashMap<IpProtocol, FlowData>,
}

impl IPRecord {
    /// Returns the `FlowData` slot for `proto`, or `None` if never populated.
    pub fn lookup_flowdata(&self, proto: IpProtocol) -> Option<&FlowData> {
        self.protocols.get(&proto)
    }
}

/// Per-source-IP state table.
#[derive(Debug, Default)]
pub struct IpStateTable {
    table: DashMap<std::net::Ipv4Addr, IPRecord>,
}

impl IpStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rolls the rate estimator forward for `packet`'s source IP and
    /// protocol, returning a snapshot of the updated record. The caller
    /// (`engine.rs`) is responsible for emitting `HOOK_CHECK_TRIGGER` with
    /// this snapshot once the dashmap entry guard has been dropped, so
    /// the trigger engine never runs while holding a shard lock.
    pub fn update(&self, packet: &PacketInfo) -> IPRecord {
        let mut entry = self.table.entry(packet.pkt_src).or_default();
        let flow = entry
            .protocols
            .entry(IpProtocol(packet.ip_type))
            .or_default();
        flow.update(packet.ts, packet.len, packet.packets, packet.new_flow);
        entry.clone()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
