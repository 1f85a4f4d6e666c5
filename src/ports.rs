// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: ports  ·  serial port enumeration, touch and detection
//
//  The upload logic only ever needs three primitives:
//
//    list   → snapshot of visible port names
//    touch  → open + close a port at a given baud (1200 = reset pulse)
//    flush  → clear the input buffer and pulse DTR/RTS
//
//  `SystemPorts` provides them on top of the serialport crate. Detection
//  (VID:PID → board guess) is only used by the CLI to pick a default port.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serialport::{available_ports, ClearBuffer, SerialPortType};

use crate::error::{Result, UploadError};

/// Baud used to open the port for the pre-upload buffer flush.
const FLUSH_BAUD: u32 = 9600;

// ─────────────────────────────────────────────────────────────────────────────
//  Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Port names visible at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSnapshot(BTreeSet<String>);

impl PortSnapshot {
    pub fn contains(&self, port: &str) -> bool {
        self.0.contains(port)
    }

    /// Ports visible in `self` that were not visible in `earlier`.
    pub fn appeared_since(&self, earlier: &PortSnapshot) -> Vec<String> {
        self.0.difference(&earlier.0).cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PortSnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        PortSnapshot(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for PortSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "}}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Capabilities
// ─────────────────────────────────────────────────────────────────────────────

pub trait PortEnumerator {
    fn list(&mut self) -> Result<PortSnapshot>;
}

pub trait PortToucher {
    /// Open and immediately close `port` at `baud`.
    fn touch(&mut self, port: &str, baud: u32) -> Result<()>;

    /// Discard pending input and pulse DTR/RTS on `port`.
    fn flush(&mut self, port: &str) -> Result<()>;
}

impl<T: PortEnumerator + ?Sized> PortEnumerator for &mut T {
    fn list(&mut self) -> Result<PortSnapshot> {
        (**self).list()
    }
}

impl<T: PortToucher + ?Sized> PortToucher for &mut T {
    fn touch(&mut self, port: &str, baud: u32) -> Result<()> {
        (**self).touch(port, baud)
    }

    fn flush(&mut self, port: &str) -> Result<()> {
        (**self).flush(port)
    }
}

/// The real thing, backed by the serialport crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn list(&mut self) -> Result<PortSnapshot> {
        let ports = available_ports().map_err(UploadError::PortEnumeration)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

impl PortToucher for SystemPorts {
    fn touch(&mut self, port: &str, baud: u32) -> Result<()> {
        let handle = serialport::new(port, baud)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|source| UploadError::PortAccess { port: port.to_owned(), source })?;
        drop(handle);
        Ok(())
    }

    fn flush(&mut self, port: &str) -> Result<()> {
        let access = |source: serialport::Error| UploadError::PortAccess { port: port.to_owned(), source };

        let mut handle = serialport::new(port, FLUSH_BAUD)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(access)?;

        // Drop whatever the sketch already sent.
        handle.clear(ClearBuffer::Input).map_err(access)?;

        handle.write_data_terminal_ready(false).map_err(access)?;
        handle.write_request_to_send(false).map_err(access)?;
        std::thread::sleep(Duration::from_millis(100));
        handle.write_data_terminal_ready(true).map_err(access)?;
        handle.write_request_to_send(true).map_err(access)?;

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Detection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DetectedPort {
    pub port:       String,
    pub board_id:   Option<&'static str>,
    pub board_name: Option<&'static str>,
    pub vid_pid:    Option<(u16, u16)>,
}

/// (VID, PID) → (board_id, board_name)
///
/// Bootloader PIDs (0x00xx) and sketch PIDs (0x80xx) of the USB-CDC boards
/// are both listed: a Leonardo shows up under a different PID, and often a
/// different port name, while its bootloader runs.
static VID_PID_MAP: &[(u16, u16, &str, &str)] = &[
    // ── Arduino genuine (VID 0x2341) ──────────────────────────────────────
    (0x2341, 0x0043, "uno",           "Arduino Uno R3"),
    (0x2341, 0x0001, "uno",           "Arduino Uno"),
    (0x2341, 0x0010, "mega2560",      "Arduino Mega 2560"),
    (0x2341, 0x0042, "mega2560",      "Arduino Mega 2560 R3"),
    (0x2341, 0x003F, "mega2560",      "Arduino Mega ADK"),
    (0x2341, 0x0036, "leonardo",      "Arduino Leonardo (bootloader)"),
    (0x2341, 0x8036, "leonardo",      "Arduino Leonardo"),
    (0x2341, 0x0037, "micro",         "Arduino Micro (bootloader)"),
    (0x2341, 0x8037, "micro",         "Arduino Micro"),
    (0x2341, 0x0038, "robot-control", "Arduino Robot Control (bootloader)"),
    (0x2341, 0x8038, "robot-control", "Arduino Robot Control"),
    // ── Arduino.org clone VID (0x2A03) ────────────────────────────────────
    (0x2A03, 0x0043, "uno",           "Arduino Uno (org clone)"),
    (0x2A03, 0x0010, "mega2560",      "Arduino Mega (org clone)"),
    (0x2A03, 0x0036, "leonardo",      "Arduino Leonardo (org, bootloader)"),
    (0x2A03, 0x8036, "leonardo",      "Arduino Leonardo (org)"),
    // ── SparkFun LilyPad USB (0x1B4F) ─────────────────────────────────────
    (0x1B4F, 0x9207, "lilypadusb",    "LilyPad Arduino USB (bootloader)"),
    (0x1B4F, 0x9208, "lilypadusb",    "LilyPad Arduino USB"),
    // ── CH340 / FTDI clones ───────────────────────────────────────────────
    (0x1A86, 0x7523, "nano",          "Arduino Nano / clone (CH340)"),
    (0x0403, 0x6001, "nano",          "Arduino Nano (FT232RL)"),
];

/// Enumerate all serial ports, tagging each with a board guess if possible.
pub fn detect_all() -> Result<Vec<DetectedPort>> {
    let mut ports: Vec<DetectedPort> = available_ports()
        .map_err(UploadError::PortEnumeration)?
        .into_iter()
        .map(|p| {
            let vid_pid = match p.port_type {
                SerialPortType::UsbPort(usb) => Some((usb.vid, usb.pid)),
                _ => None,
            };
            classify(p.port_name, vid_pid)
        })
        .collect();
    ports.sort_by(|a, b| a.port.cmp(&b.port));
    Ok(ports)
}

/// Return the most likely upload port (first recognised board, then the
/// first USB-serial-looking port).
pub fn best_port() -> Result<Option<String>> {
    let all = detect_all()?;

    if let Some(d) = all.iter().find(|p| p.board_id.is_some()) {
        return Ok(Some(d.port.clone()));
    }

    Ok(all.into_iter().find(|p| looks_like_serial(&p.port)).map(|p| p.port))
}

fn classify(port: String, vid_pid: Option<(u16, u16)>) -> DetectedPort {
    let known = vid_pid.and_then(|(vid, pid)| {
        VID_PID_MAP
            .iter()
            .find(|(v, p, _, _)| *v == vid && *p == pid)
            .map(|(_, _, id, name)| (*id, *name))
    });

    DetectedPort {
        port,
        board_id:   known.map(|(id, _)| id),
        board_name: known.map(|(_, name)| name),
        vid_pid,
    }
}

fn looks_like_serial(port: &str) -> bool {
    port.contains("ttyUSB") || port.contains("ttyACM")
        || port.contains("usbserial") || port.contains("usbmodem")
        || (port.starts_with("COM") && port.len() <= 6)
}
