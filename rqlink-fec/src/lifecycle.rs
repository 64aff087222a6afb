//! Open/Closing/Closed slot guarding a handle's engine resource.
//!
//! Operations borrow the resource under a read lock; `close` takes it out
//! under the write lock, so it waits for in-flight operations and nothing can
//! observe a half-released engine.

use crate::{Error, Result};
use parking_lot::RwLock;

/// Externally visible handle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Operations are accepted.
    Open,
    /// `close` is tearing the handle down.
    Closing,
    /// Teardown finished.
    Closed,
}

#[derive(Debug)]
enum Slot<R> {
    Open(R),
    Closing,
    Closed,
}

/// Owns a handle's resource until it is closed.
#[derive(Debug)]
pub struct Lifecycle<R> {
    slot: RwLock<Slot<R>>,
}

impl<R> Lifecycle<R> {
    /// Start out `Open` with `resource`.
    pub fn new(resource: R) -> Self {
        Self { slot: RwLock::new(Slot::Open(resource)) }
    }

    /// Current state.
    pub fn state(&self) -> HandleState {
        match *self.slot.read() {
            Slot::Open(_) => HandleState::Open,
            Slot::Closing => HandleState::Closing,
            Slot::Closed => HandleState::Closed,
        }
    }

    /// Run `f` against the open resource; `AlreadyClosed` otherwise.
    pub fn with<T>(&self, f: impl FnOnce(&R) -> Result<T>) -> Result<T> {
        match &*self.slot.read() {
            Slot::Open(resource) => f(resource),
            Slot::Closing | Slot::Closed => Err(Error::AlreadyClosed),
        }
    }

    /// Move `Open -> Closing` and hand the resource to the caller.
    pub fn begin_close(&self) -> Result<R> {
        let mut slot = self.slot.write();
        match std::mem::replace(&mut *slot, Slot::Closing) {
            Slot::Open(resource) => Ok(resource),
            other => {
                *slot = other;
                Err(Error::AlreadyClosed)
            }
        }
    }

    /// Move `Closing -> Closed`.
    pub fn finish_close(&self) {
        *self.slot.write() = Slot::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_transitions_once() {
        let lc = Lifecycle::new(5u32);
        assert_eq!(lc.state(), HandleState::Open);
        assert_eq!(lc.with(|v| Ok(*v + 1)).unwrap(), 6);

        assert_eq!(lc.begin_close().unwrap(), 5);
        assert_eq!(lc.state(), HandleState::Closing);
        assert!(matches!(lc.with(|v| Ok(*v)), Err(Error::AlreadyClosed)));
        assert!(matches!(lc.begin_close(), Err(Error::AlreadyClosed)));

        lc.finish_close();
        assert_eq!(lc.state(), HandleState::Closed);
        assert!(matches!(lc.begin_close(), Err(Error::AlreadyClosed)));
        assert_eq!(lc.state(), HandleState::Closed);
    }

    #[test]
    fn close_waits_for_readers() {
        use std::sync::{Arc, Barrier};
        use std::time::Duration;

        let lc = Arc::new(Lifecycle::new(()));
        let entered = Arc::new(Barrier::new(2));
        let reader = {
            let lc = lc.clone();
            let entered = entered.clone();
            std::thread::spawn(move || {
                lc.with(|_| {
                    entered.wait();
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(HandleState::Open)
                })
            })
        };
        entered.wait();
        lc.begin_close().unwrap();
        // the reader held the lock for its whole operation
        assert_eq!(reader.join().unwrap().unwrap(), HandleState::Open);
    }
}
