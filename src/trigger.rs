//! The trigger engine: linear per-protocol rule evaluation and the
//! ban-record lifecycle. This is the heart of the system.
//!
//! Rule evaluation preserves a deliberate-looking inversion: a trigger with
//! both `target_pps` and `target_mbps` set can have its pps-triggered fire
//! cleared again when the observed mbps sits below `target_mbps`, which is
//! a stronger condition than the separate `below_mbps` suppressor. Kept
//! verbatim since deployed configs may rely on it (see DESIGN.md). Each
//! trigger list is built by prepending on load (`insert(0, ..)`), so
//! evaluation order is most-recently-configured-first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::actions::{Action, ActionKind, ActionRegistry};
use crate::clock::Clock;
use crate::config::{EngineConfig, TriggerConfig};
use crate::hooks::HookRegistry;
use crate::ipstate::IPRecord;
use crate::packet::{tcp_flags, PacketInfo};

/// IP protocol number, keyed for trigger-list and flow-data lookups.
///
/// A newtype rather than a bare `u8` so trigger/config code reads as
/// "protocol" rather than "byte"; indexes directly into `t_list[proto]`'s
/// Rust equivalent (`HashMap<u8, Vec<Trigger>>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpProtocol(pub u8);

impl IpProtocol {
    pub const ICMP: IpProtocol = IpProtocol(1);
    pub const TCP: IpProtocol = IpProtocol(6);
    pub const UDP: IpProtocol = IpProtocol(17);
}

/// Which side of a packet a ban is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Src,
    #[default]
    Dst,
}

/// A compiled trigger rule. Immutable once constructed; lives for process
/// lifetime.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub protocol: IpProtocol,
    pub target_pps: u32,
    pub target_mbps: u32,
    pub target_flowcount: u32,
    pub below_mbps: u32,
    pub tcp_syn_only: bool,
    pub direction: Direction,
    /// Per-trigger expiry override; falls back to the engine-wide default.
    pub expiry: Option<u64>,
    actions: Vec<Arc<dyn Action>>,
}

/// An active mitigation. Holds value-copies of the triggering packet and
/// IP record, not references, since the record can outlive both.
#[derive(Clone)]
pub struct BanRecord {
    pub direction: Direction,
    pub packet: PacketInfo,
    pub iprecord: IPRecord,
    added: u64,
    expiry_ts: u64,
    actions: Vec<Arc<dyn Action>>,
}

impl BanRecord {
    /// Creation timestamp; read-only from outside this module.
    pub fn added(&self) -> u64 {
        self.added
    }

    /// Expiry timestamp; read-only from outside this module.
    pub fn expiry_ts(&self) -> u64 {
        self.expiry_ts
    }

    #[cfg(test)]
    pub(crate) fn for_test(packet: PacketInfo, added: u64, expiry_ts: u64) -> Self {
        Self {
            direction: Direction::Dst,
            packet,
            iprecord: IPRecord::default(),
            added,
            expiry_ts,
            actions: Vec::new(),
        }
    }
}

impl std::fmt::Debug for BanRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BanRecord")
            .field("direction", &self.direction)
            .field("added", &self.added)
            .field("expiry_ts", &self.expiry_ts)
            .finish()
    }
}

/// Owns the per-protocol trigger lists, the default expiry, the ban trie,
/// and the pending-expiry schedule. Mutated only at construction (triggers)
/// and on the event-loop thread (bans/expiries).
pub struct TriggerEngine {
    triggers: HashMap<u8, Vec<Trigger>>,
    default_expiry: u64,
    ban_trie: crate::bantrie::BanTrie<BanRecord>,
    expiries: BinaryHeap<Reverse<(u64, Ipv4Addr)>>,
}

impl TriggerEngine {
    pub fn new(default_expiry: u64) -> Self {
        Self {
            triggers: HashMap::new(),
            default_expiry,
            ban_trie: crate::bantrie::BanTrie::new(),
            expiries: BinaryHeap::new(),
        }
    }

    /// Builds an engine from a parsed configuration tree, resolving each
    /// trigger's action names against `registry`. Unknown names are
    /// silently skipped; the trigger still loads with whatever known
    /// actions it found.
    pub fn from_config(cfg: &EngineConfig, registry: &ActionRegistry) -> Self {
        let mut engine = Self::new(cfg.expiry);
        for trigger_cfg in &cfg.triggers {
            engine.add_trigger(trigger_cfg, registry);
        }
        engine
    }

    /// Compiles and prepends one `[[trigger]]` table, matching
    /// `parse_trigger`'s `t->next = t_list[proto]; t_list[proto] = t;`.
    pub fn add_trigger(&mut self, cfg: &TriggerConfig, registry: &ActionRegistry) {
        let (protocol, tcp_syn_only) = cfg.protocol.resolve();
        let resolved: Vec<Arc<dyn Action>> = cfg
            .actions
            .iter()
            .filter_map(|name| registry.find(name))
            .collect();

        let trigger = Trigger {
            protocol,
            target_pps: cfg.target_pps,
            target_mbps: cfg.target_mbps,
            target_flowcount: cfg.flowcount,
            below_mbps: cfg.below_mbps,
            tcp_syn_only,
            direction: cfg.action_direction.into(),
            expiry: cfg.expiry,
            actions: resolved,
        };

        self.triggers.entry(protocol.0).or_default().insert(0, trigger);
    }

    /// `HOOK_CHECK_TRIGGER(packet, iprecord)`. Evaluates every trigger
    /// registered for `packet.ip_type`, in insertion-reversed order, and
    /// bans whenever a trigger still fires after the exemption hook.
    pub fn check_trigger(
        &mut self,
        packet: &PacketInfo,
        iprecord: &IPRecord,
        hooks: &HookRegistry,
        clock: &dyn Clock,
    ) {
        let flow = match iprecord.lookup_flowdata(IpProtocol(packet.ip_type)) {
            Some(flow) => flow.clone(),
            None => return,
        };

        let mbps = (flow.flow / 1_000_000.0).floor() as i64;
        let pps = flow.pps;

        let firing: Vec<usize> = {
            let Some(list) = self.triggers.get(&packet.ip_type) else {
                return;
            };
            let mut firing = Vec::new();
            for (idx, trigger) in list.iter().enumerate() {
                let mut fire = false;

                if trigger.target_pps > 0 && pps > trigger.target_pps as f64 {
                    fire = true;
                }
                if trigger.target_mbps > 0 && mbps > trigger.target_mbps as i64 {
                    fire = true;
                }
                // Can override a target_pps-triggered fire when mbps sits
                // below the mbps target; see DESIGN.md.
                if trigger.target_mbps > 0 && mbps < trigger.target_mbps as i64 {
                    fire = false;
                }
                if trigger.below_mbps > 0 && mbps > trigger.below_mbps as i64 {
                    fire = false;
                }
                if trigger.tcp_syn_only && packet.tcp_flags != tcp_flags::SYN {
                    fire = false;
                }
                if trigger.target_flowcount > 0 && flow.count < trigger.target_flowcount {
                    fire = false;
                }

                if fire {
                    hooks.check_exempt(packet, iprecord, &mut fire);
                }
                if fire {
                    firing.push(idx);
                }
            }
            firing
        };

        for idx in firing {
            self.ban(packet.ip_type, idx, packet, iprecord, clock);
        }
    }

    /// `ban(t, packet, iprecord)`.
    fn ban(&mut self, proto: u8, idx: usize, packet: &PacketInfo, iprecord: &IPRecord, clock: &dyn Clock) {
        let trigger = &self.triggers[&proto][idx];
        let key = match trigger.direction {
            Direction::Src => packet.pkt_src,
            Direction::Dst => packet.pkt_dst,
        };

        if self.ban_trie.contains(key, 32) {
            tracing::trace!(?key, "ban already active, dedup no-op");
            return;
        }

        let now = clock.now();
        let expiry_secs = trigger.expiry.unwrap_or(self.default_expiry);
        let record = BanRecord {
            direction: trigger.direction,
            packet: *packet,
            iprecord: iprecord.clone(),
            added: now,
            expiry_ts: now + expiry_secs,
            actions: trigger.actions.clone(),
        };

        self.ban_trie.insert(key, 32, record);
        let inserted = self
            .ban_trie
            .lookup_exact(key, 32)
            .expect("record was just inserted");
        for action in &inserted.actions {
            action.call(ActionKind::Ban, inserted.direction, &inserted.packet, inserted);
        }
        self.expiries.push(Reverse((inserted.expiry_ts, key)));

        tracing::debug!(?key, proto, expiry_secs, "trigger fired, ban installed");
    }

    /// Pops and fires every ban whose expiry has elapsed at `clock.now()`.
    /// Called by the event loop's timer tick (`eventloop.rs`).
    pub fn expire_due(&mut self, clock: &dyn Clock) {
        let now = clock.now();
        while let Some(&Reverse((ts, key))) = self.expiries.peek() {
            if ts > now {
                break;
            }
            self.expiries.pop();

            match self.ban_trie.lookup_exact(key, 32) {
                Some(record) if record.expiry_ts <= now => {}
                _ => continue, // already expired, or re-banned with a later expiry
            }
            self.expire(key);
        }
    }

    /// `expire(record)`.
    fn expire(&mut self, key: Ipv4Addr) {
        if let Some(record) = self.ban_trie.remove(key, 32) {
            for action in &record.actions {
                action.call(ActionKind::Unban, record.direction, &record.packet, &record);
            }
            tracing::debug!(?key, "ban expired, unban fired");
        }
    }

    pub fn is_banned(&self, key: Ipv4Addr) -> bool {
        self.ban_trie.contains(key, 32)
    }

    pub fn ban_record(&self, key: Ipv4Addr) -> Option<&BanRecord> {
        self.ban_trie.lookup_exact(key, 32)
    }

    pub fn pending_expiry_count(&self) -> usize {
        self.expiries.len()
    }
}
