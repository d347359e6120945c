use tokio::sync::watch;

/// Connected flag plus the number of flips so far.
///
/// `watch` only keeps the latest value, so an observer that wakes up late
/// compares epochs to learn that it missed a round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub connected: bool,

    /// Incremented on every flip of `connected`
    pub epoch: u64,
}

impl Readiness {
    /// Number of flips between `previous` and this value
    pub fn flips_since(&self, previous: &Readiness) -> u64 {
        self.epoch.wrapping_sub(previous.epoch)
    }
}

/// Sending side of a transport's readiness
#[derive(Debug)]
pub struct ReadinessSignal {
    tx: watch::Sender<Readiness>,
}

impl ReadinessSignal {
    pub fn new(connected: bool) -> Self {
        let (tx, _) = watch::channel(Readiness { connected, epoch: 0 });
        ReadinessSignal { tx }
    }

    /// Flip to `connected`. Returns false if it already was.
    pub fn set(&self, connected: bool) -> bool {
        self.tx.send_if_modified(|readiness| {
            if readiness.connected == connected {
                return false;
            }
            readiness.connected = connected;
            readiness.epoch += 1;
            true
        })
    }

    pub fn get(&self) -> Readiness {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_flips_bump_epoch() {
        let signal = ReadinessSignal::new(false);
        assert!(!signal.set(false));
        assert_eq!(signal.get().epoch, 0);

        assert!(signal.set(true));
        assert!(signal.set(false));
        assert!(signal.set(true));

        let current = signal.get();
        assert!(current.connected);
        assert_eq!(current.epoch, 3);
    }

    #[test]
    fn test_late_observer_sees_missed_flips() {
        let signal = ReadinessSignal::new(true);
        let mut rx = signal.subscribe();
        let seen = *rx.borrow_and_update();

        signal.set(false);
        signal.set(true);

        assert!(rx.has_changed().unwrap());
        let current = *rx.borrow_and_update();
        assert_eq!(current.connected, seen.connected);
        assert_eq!(current.flips_since(&seen), 2);
    }
}
