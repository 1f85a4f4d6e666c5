// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: clock
// ─────────────────────────────────────────────────────────────────────────────

use std::time::Duration;

/// Every timed wait of an upload goes through here so the reset state
/// machine can be driven without real sleeps.
pub trait Clock {
    fn sleep(&mut self, d: Duration);
}

/// Blocking `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&mut self, d: Duration) {
        std::thread::sleep(d);
    }
}

impl<T: Clock + ?Sized> Clock for &mut T {
    fn sleep(&mut self, d: Duration) {
        (**self).sleep(d)
    }
}
