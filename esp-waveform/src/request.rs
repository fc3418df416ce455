//! # Control requests
//!
//! Foreground code and ordinary interrupts never touch the `enabled` mask.
//! They post a bit here and wait for the dispatch loop to fold it in and
//! clear it. Posting is an OR and the loop clears exactly the bits it read,
//! so concurrent posters cannot wipe out each other's requests.

use portable_atomic::{AtomicU32, Ordering};

/// A pending change to the enabled set, as consumed by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Pending {
    pub enable: u32,
    pub disable: u32,
}

impl Pending {
    pub fn is_empty(&self) -> bool {
        self.enable | self.disable == 0
    }

    /// The enabled mask after applying this request to `enabled`.
    pub fn apply(&self, enabled: u32) -> u32 {
        (enabled & !self.disable) | self.enable
    }
}

/// The `to_enable` / `to_disable` mailbox.
#[derive(Debug)]
pub(crate) struct Requests {
    to_enable: AtomicU32,
    to_disable: AtomicU32,
}

impl Requests {
    pub const fn new() -> Self {
        Self {
            to_enable: AtomicU32::new(0),
            to_disable: AtomicU32::new(0),
        }
    }

    pub fn request_enable(&self, mask: u32) {
        self.to_enable.fetch_or(mask, Ordering::Release);
    }

    pub fn request_disable(&self, mask: u32) {
        self.to_disable.fetch_or(mask, Ordering::Release);
    }

    /// Whether any bit of `mask` is still waiting to be enabled.
    pub fn enable_pending(&self, mask: u32) -> bool {
        self.to_enable.load(Ordering::Acquire) & mask != 0
    }

    /// Whether any bit of `mask` is still waiting to be disabled.
    pub fn disable_pending(&self, mask: u32) -> bool {
        self.to_disable.load(Ordering::Acquire) & mask != 0
    }

    /// Snapshot of everything posted so far. Dispatch loop only.
    pub fn take_snapshot(&self) -> Pending {
        Pending {
            enable: self.to_enable.load(Ordering::Acquire),
            disable: self.to_disable.load(Ordering::Acquire),
        }
    }

    /// Acknowledges the bits of `pending`, releasing any waiter on them.
    /// Dispatch loop only, after the enabled mask has been updated.
    pub fn acknowledge(&self, pending: Pending) {
        if pending.enable != 0 {
            self.to_enable.fetch_and(!pending.enable, Ordering::Release);
        }
        if pending.disable != 0 {
            self.to_disable.fetch_and(!pending.disable, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_wins_over_stale_enable() {
        let pending = Pending {
            enable: 0b0100,
            disable: 0b0011,
        };
        assert_eq!(pending.apply(0b1011), 0b1100);
    }

    #[test]
    fn late_request_survives_acknowledge() {
        let requests = Requests::new();
        requests.request_enable(1 << 3);

        let pending = requests.take_snapshot();
        // Another context posts between the loop's read and its clear.
        requests.request_enable(1 << 7);
        requests.acknowledge(pending);

        assert!(!requests.enable_pending(1 << 3));
        assert!(requests.enable_pending(1 << 7));
    }

    #[test]
    fn empty_snapshot() {
        let requests = Requests::new();
        assert!(requests.take_snapshot().is_empty());

        requests.request_disable(1 << 16);
        let pending = requests.take_snapshot();
        assert!(!pending.is_empty());
        assert_eq!(pending.disable, 1 << 16);
    }
}
