//! Single-threaded cooperative event loop.
//!
//! Generalized from the teacher's `tokio::select!`-driven background
//! tasks (`process_mapper.rs`'s 500ms scan tick, `rate_limiter.rs`'s
//! token-bucket refill) into the one loop spec §5 requires: multiplex
//! packet-source readiness against the ban-expiry timer, drain up to
//! `PACKET_DRAIN_BUDGET` packets per readiness event, then yield. Runs on
//! a single-worker (`current_thread`) `tokio` runtime — no data is shared
//! across threads, so the engine needs no internal locking beyond what
//! `FlowCache`/`IpStateTable` already do for their own maps.

use std::time::Duration;

use crate::clock::Clock;
use crate::config::PACKET_DRAIN_BUDGET;
use crate::engine::Engine;
use crate::source::PacketSource;

/// How often the loop checks for elapsed ban expiries between packet
/// drains. Ban timers are one-shot in spec terms; polling this often is
/// indistinguishable from true one-shot timers at the granularity the
/// trigger engine's expiry ("seconds") operates at.
pub const EXPIRY_TICK: Duration = Duration::from_millis(200);

/// Drives `source` through `engine` until the source reports itself
/// exhausted (replay mode) or `shutdown` is requested.
///
/// Each iteration: drain up to `PACKET_DRAIN_BUDGET` packets (yielding
/// back to the runtime when the source would block), then let any bans
/// whose expiry has elapsed fire their UNBAN actions. This ordering
/// matches spec §5: "between a timer firing and resuming I/O, no other
/// core work proceeds" — expiry always runs between, never during, a
/// packet-drain batch.
pub async fn run<S: PacketSource>(
    mut source: S,
    mut engine: Engine,
    clock: &dyn Clock,
    shutdown: &tokio::sync::Notify,
) -> std::io::Result<()> {
    loop {
        let batch = source.recv_batch(PACKET_DRAIN_BUDGET)?;
        for packet in batch {
            engine.process_packet(packet, clock);
        }

        engine.expire_due(clock);

        if source.is_exhausted() {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(EXPIRY_TICK) => {}
            _ = shutdown.notified() => return Ok(()),
        }
    }
}
