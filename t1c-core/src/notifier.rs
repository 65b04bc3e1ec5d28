//! C9 — Notifier: a typed bit-mask mailbox per worker, the only
//! cross-worker signalling primitive the core may assume (spec sections
//! 4.9, 5).
//!
//! `post` ORs bits into a worker's mailbox; `wait` blocks until at least
//! one bit is set (or a timeout elapses), then atomically reads and
//! clears the mailbox. Multiple posts between waits coalesce: presence
//! survives, count does not (testable property, spec section 8).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

bitflags::bitflags! {
    /// Notification bits the frame pipeline (C6) consumes (spec section 4.6.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PipelineBits: u32 {
        const SET_SPOT_LOCATION   = 1 << 0;
        const SET_REGION_LOCATION = 1 << 1;
        const RESTORE_DEFAULTS    = 1 << 2;
        const CAL_1PT             = 1 << 3;
        const CAL_2PT_LOW         = 1 << 4;
        const CAL_2PT_HIGH        = 1 << 5;
        const MANUAL_FFC          = 1 << 6;
        const ENV_UPDATED         = 1 << 7;
        const CONFIG_UPDATED      = 1 << 8;
        const NEW_AMBIENT         = 1 << 9;
        const NEW_DISTANCE        = 1 << 10;
        const FILE_WANTS_IMAGE    = 1 << 11;
        const SHUTDOWN            = 1 << 31;
    }
}

bitflags::bitflags! {
    /// Notification bits a consumer worker (display/file-save/web) waits on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConsumerBits: u32 {
        const NEW_FRAME = 1 << 0;
        const SHUTDOWN  = 1 << 31;
    }
}

/// One worker's mailbox: a bitmask plus a condvar to block on.
struct Mailbox {
    bits: Mutex<u32>,
    cv: Condvar,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn post(&self, bits: u32) {
        let mut guard = self.bits.lock();
        *guard |= bits;
        self.cv.notify_all();
    }

    /// Block until at least one bit is set or `timeout` elapses, then
    /// atomically read-and-clear. Returns 0 on timeout with nothing posted.
    fn wait(&self, timeout: Duration) -> u32 {
        let mut guard = self.bits.lock();
        if *guard == 0 {
            let result = self.cv.wait_for(&mut guard, timeout);
            if result.timed_out() && *guard == 0 {
                return 0;
            }
        }
        std::mem::replace(&mut *guard, 0)
    }

    /// Non-blocking drain: returns and clears whatever is currently set.
    fn try_wait(&self) -> u32 {
        let mut guard = self.bits.lock();
        std::mem::replace(&mut *guard, 0)
    }
}

/// A named mailbox owned by [`Notifier`]. Cloning is cheap (an `Arc`
/// handle); every clone posts/waits on the same underlying mailbox.
#[derive(Clone)]
pub struct MailboxHandle(Arc<Mailbox>);

impl MailboxHandle {
    pub fn post(&self, bits: u32) {
        self.0.post(bits);
    }

    pub fn wait(&self, timeout: Duration) -> u32 {
        self.0.wait(timeout)
    }

    pub fn try_wait(&self) -> u32 {
        self.0.try_wait()
    }

    /// Cancel-idempotent: wake a blocked `wait` immediately without
    /// requiring a real event. Safe to call repeatedly or when no one is
    /// waiting.
    pub fn cancel(&self) {
        self.0.cv.notify_all();
    }

    /// Drop whatever is pending without anyone observing it.
    pub fn drain(&self) {
        let _ = self.0.try_wait();
    }
}

/// The notifier: one mailbox per named worker. Workers are identified by
/// a small `Copy` key so the registry can live behind `Arc` and be shared
/// freely across threads.
#[derive(Clone)]
pub struct Notifier<K> {
    mailboxes: Arc<parking_lot::RwLock<std::collections::HashMap<K, MailboxHandle>>>,
}

impl<K: Eq + std::hash::Hash + Clone> Notifier<K> {
    pub fn new() -> Self {
        Self {
            mailboxes: Arc::new(parking_lot::RwLock::new(std::collections::HashMap::new())),
        }
    }

    /// Get or create the mailbox for `worker`.
    pub fn mailbox(&self, worker: K) -> MailboxHandle {
        if let Some(h) = self.mailboxes.read().get(&worker) {
            return h.clone();
        }
        let mut w = self.mailboxes.write();
        w.entry(worker)
            .or_insert_with(|| MailboxHandle(Arc::new(Mailbox::new())))
            .clone()
    }

    pub fn post(&self, worker: K, bits: u32) {
        self.mailbox(worker).post(bits);
    }
}

impl<K: Eq + std::hash::Hash + Clone> Default for Notifier<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalescing_keeps_presence_not_count() {
        let mb = MailboxHandle(Arc::new(Mailbox::new()));
        mb.post(PipelineBits::NEW_AMBIENT.bits());
        mb.post(PipelineBits::NEW_DISTANCE.bits());
        let got = mb.wait(Duration::from_millis(10));
        assert_eq!(
            got,
            (PipelineBits::NEW_AMBIENT | PipelineBits::NEW_DISTANCE).bits()
        );
        // A second wait with nothing new posted must see nothing.
        assert_eq!(mb.try_wait(), 0);
    }

    #[test]
    fn wait_times_out_with_zero() {
        let mb = MailboxHandle(Arc::new(Mailbox::new()));
        let got = mb.wait(Duration::from_millis(5));
        assert_eq!(got, 0);
    }

    #[test]
    fn distinct_workers_have_independent_mailboxes() {
        let n: Notifier<&'static str> = Notifier::new();
        n.post("a", 0b1);
        n.post("b", 0b10);
        assert_eq!(n.mailbox("a").try_wait(), 0b1);
        assert_eq!(n.mailbox("b").try_wait(), 0b10);
    }
}
