// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: reset  ·  1200-baud touch and upload port reacquisition
//
//  USB-CDC bootloaders (Caterina and friends) reset into the bootloader when
//  their port is opened and closed at 1200 baud. The bootloader then comes up
//  as a *new* serial device, often under a different name, so the port we
//  flash through has to be found again:
//
//    pre-flash   snapshot → touch @1200 → poll every 250 ms (10 s budget)
//                first new port wins; after 5 s the selected port itself
//                is accepted if it is visible
//    post-flash  wait 500 ms → poll every 100 ms (2 s budget) for the
//                selected port → touch it at serial.debug_rate
//
//  Only the pre-flash timeout is fatal.
// ─────────────────────────────────────────────────────────────────────────────

use std::time::Duration;

use crate::clock::Clock;
use crate::config::ConfigSource;
use crate::error::{Result, UploadError};
use crate::ports::{PortEnumerator, PortSnapshot, PortToucher};

/// `bootloader.path` values whose boards need the 1200-baud touch.
const RESET_BOOTLOADERS: &[&str] = &[
    "caterina",
    "stk500v2",
    "caterina-Arduino_Robot",
    "caterina-LilyPadUSB",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    None,
    CaterinaLike,
}

impl ResetKind {
    pub fn of(board: &impl ConfigSource) -> Self {
        match board.get("bootloader.path") {
            Some(path) if RESET_BOOTLOADERS.contains(&path) => ResetKind::CaterinaLike,
            _ => ResetKind::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetTiming {
    pub magic_baud:       u32,
    pub poll_interval:    Duration,
    pub poll_budget:      Duration,
    /// After this long, a visible selected port is taken as the upload port.
    pub same_port_after:  Duration,
    pub settle:           Duration,
    pub restore_interval: Duration,
    pub restore_budget:   Duration,
    pub restore_debounce: Duration,
}

impl Default for ResetTiming {
    fn default() -> Self {
        ResetTiming {
            magic_baud:       1200,
            poll_interval:    Duration::from_millis(250),
            poll_budget:      Duration::from_millis(10_000),
            same_port_after:  Duration::from_millis(5_000),
            settle:           Duration::from_millis(500),
            restore_interval: Duration::from_millis(100),
            restore_budget:   Duration::from_millis(2_000),
            restore_debounce: Duration::from_millis(100),
        }
    }
}

impl ResetTiming {
    /// Both polling intervals must be non-zero for the waits to end.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(UploadError::invalid("reset.poll_interval", "must be greater than zero"));
        }
        if self.restore_interval.is_zero() {
            return Err(UploadError::invalid("reset.restore_interval", "must be greater than zero"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Pre-flash
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    Found(String),
    Pending,
    TimedOut,
}

/// Loop state of the pre-flash port search. Feed it snapshots with
/// [`observe`](Self::observe) and advance time with [`tick`](Self::tick).
#[derive(Debug, Clone)]
pub struct Reacquisition {
    selected:      String,
    last_snapshot: PortSnapshot,
    elapsed:       Duration,
    timing:        ResetTiming,
}

impl Reacquisition {
    pub fn new(selected: &str, before: PortSnapshot, timing: ResetTiming) -> Self {
        Reacquisition {
            selected: selected.to_owned(),
            last_snapshot: before,
            elapsed: Duration::ZERO,
            timing,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_exhausted(&self) -> bool {
        self.elapsed >= self.timing.poll_budget
    }

    /// Compare a fresh snapshot against the previous one. Ports that vanished
    /// are forgotten, so a port that disappears and comes back counts as new.
    pub fn observe(&mut self, now: PortSnapshot) -> Poll {
        let appeared = now.appeared_since(&self.last_snapshot);
        log::debug!("PORTS {} / {} => {:?}", self.last_snapshot, now, appeared);

        if let Some(port) = appeared.into_iter().next() {
            return Poll::Found(port);
        }
        self.last_snapshot = now;
        Poll::Pending
    }

    /// Account for one poll interval having passed.
    pub fn tick(&mut self) -> Poll {
        self.elapsed += self.timing.poll_interval;

        // Windows can take a long time to drop and re-add the port; past
        // this point assume the selected port already is the bootloader.
        if self.elapsed >= self.timing.same_port_after && self.last_snapshot.contains(&self.selected) {
            return Poll::Found(self.selected.clone());
        }
        if self.is_exhausted() {
            return Poll::TimedOut;
        }
        Poll::Pending
    }
}

/// Reset the board on `selected` into its bootloader and return the port the
/// bootloader enumerated on.
pub fn reacquire<P, C>(ports: &mut P, clock: &mut C, selected: &str, timing: ResetTiming) -> Result<String>
where
    P: PortEnumerator + PortToucher,
    C: Clock,
{
    timing.validate()?;
    let before = ports.list()?;

    if before.contains(selected) {
        log::info!("Forcing reset using {}bps open/close on port {}", timing.magic_baud, selected);
        ports.touch(selected, timing.magic_baud)?;
    }

    let mut search = Reacquisition::new(selected, before, timing);
    while !search.is_exhausted() {
        if let Poll::Found(port) = search.observe(ports.list()?) {
            log::info!("Found upload port: {}", port);
            return Ok(port);
        }

        clock.sleep(timing.poll_interval);

        match search.tick() {
            Poll::Found(port) => {
                log::info!("Uploading using selected port: {}", port);
                return Ok(port);
            }
            Poll::TimedOut => break,
            Poll::Pending => {}
        }
    }

    Err(UploadError::DeviceNotFound {
        port:       selected.to_owned(),
        elapsed_ms: search.elapsed().as_millis() as u64,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
//  Post-flash
// ─────────────────────────────────────────────────────────────────────────────

/// Smallest amount of budget one restore poll consumes.
const MIN_RESTORE_STEP: Duration = Duration::from_millis(1);

/// What happened to the sketch's port after a successful flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restoration {
    /// The port came back and was re-opened at the normal rate.
    Restored { port: String, baud: u32 },
    /// The port never reappeared within the budget (the sketch may not use
    /// serial at all).
    NotReturned { port: String },
    /// The port came back but could not be re-opened.
    TouchFailed { port: String, reason: String },
}

impl Restoration {
    pub fn is_restored(&self) -> bool {
        matches!(self, Restoration::Restored { .. })
    }
}

/// Wait for the sketch port `selected` to come back and re-open it at `baud`
/// so that later opens do not trigger another 1200-baud reset.
pub fn restore<P, C>(ports: &mut P, clock: &mut C, selected: &str, baud: u32, timing: ResetTiming) -> Restoration
where
    P: PortEnumerator + PortToucher,
    C: Clock,
{
    clock.sleep(timing.settle);

    let step = timing.restore_interval.max(MIN_RESTORE_STEP);
    let mut elapsed = Duration::ZERO;
    while elapsed < timing.restore_budget {
        match ports.list() {
            Ok(now) if now.contains(selected) => {
                clock.sleep(timing.restore_debounce);
                log::info!("Setting baud rate to {} on {}", baud, selected);
                return match ports.touch(selected, baud) {
                    Ok(()) => Restoration::Restored { port: selected.to_owned(), baud },
                    Err(e) => {
                        log::warn!("could not restore {}: {}", selected, e);
                        Restoration::TouchFailed { port: selected.to_owned(), reason: e.to_string() }
                    }
                };
            }
            Ok(_) => {}
            Err(e) => log::warn!("port scan failed while waiting for {}: {}", selected, e),
        }
        clock.sleep(timing.restore_interval);
        elapsed += step;
    }

    log::warn!("{} did not reappear after upload; baud rate left unchanged", selected);
    Restoration::NotReturned { port: selected.to_owned() }
}
