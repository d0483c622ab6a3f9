//! The exemption hook: the one genuinely pluggable extension point the core
//! publishes.
//!
//! `HOOK_CHECK_TRIGGER` has exactly one subscriber in this crate — the
//! trigger engine itself — so it is realized as a direct call from
//! `engine.rs` rather than a registered closure; see DESIGN.md.
//! `HOOK_CHECK_EXEMPT` has a genuine external subscriber (policy code
//! vetoing a pending ban) and is kept as a real multicast list.

use crate::ipstate::IPRecord;
use crate::packet::PacketInfo;

type ExemptSubscriber = dyn Fn(&PacketInfo, &IPRecord, &mut bool) + Send + Sync;

/// Named multicast dispatch point for `HOOK_CHECK_EXEMPT`.
#[derive(Default)]
pub struct HookRegistry {
    exempt_subscribers: Vec<Box<ExemptSubscriber>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for `HOOK_CHECK_EXEMPT`. Subscribers may clear
    /// `do_trigger` to suppress a pending ban; once cleared it is never set
    /// back by a later subscriber.
    pub fn register_check_exempt<F>(&mut self, subscriber: F)
    where
        F: Fn(&PacketInfo, &IPRecord, &mut bool) + Send + Sync + 'static,
    {
        self.exempt_subscribers.push(Box::new(subscriber));
    }

    /// Emits `HOOK_CHECK_EXEMPT(packet, iprecord, &mut do_trigger)`.
    pub fn check_exempt(&self, packet: &PacketInfo, iprecord: &IPRecord, do_trigger: &mut bool) {
        for subscriber in &self.exempt_subscribers {
            subscriber(packet, iprecord, do_trigger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::SystemTime;

    fn pkt(src: Ipv4Addr) -> PacketInfo {
        let mut p = PacketInfo::new(SystemTime::UNIX_EPOCH, 0, 1);
        p.pkt_src = src;
        p
    }

    #[test]
    fn test_no_subscribers_leaves_fire_untouched() {
        let hooks = HookRegistry::new();
        let mut fire = true;
        hooks.check_exempt(&pkt(Ipv4Addr::new(10, 0, 0, 1)), &IPRecord::default(), &mut fire);
        assert!(fire);
    }

    #[test]
    fn test_subscriber_can_clear_fire() {
        let mut hooks = HookRegistry::new();
        hooks.register_check_exempt(|_pkt, _rec, do_trigger| {
            *do_trigger = false;
        });
        let mut fire = true;
        hooks.check_exempt(&pkt(Ipv4Addr::new(10, 0, 0, 1)), &IPRecord::default(), &mut fire);
        assert!(!fire);
    }

    #[test]
    fn test_subscriber_only_exempts_matching_source() {
        let mut hooks = HookRegistry::new();
        let exempt_src = Ipv4Addr::new(10, 0, 0, 9);
        hooks.register_check_exempt(move |packet, _rec, do_trigger| {
            if packet.pkt_src == exempt_src {
                *do_trigger = false;
            }
        });

        let mut fire = true;
        hooks.check_exempt(&pkt(exempt_src), &IPRecord::default(), &mut fire);
        assert!(!fire);

        let mut fire_other = true;
        hooks.check_exempt(&pkt(Ipv4Addr::new(10, 0, 0, 1)), &IPRecord::default(), &mut fire_other);
        assert!(fire_other);
    }
}
