// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: boards  ·  built-in board presets and programmer table
//
//  Each board carries the keys an upload reads (upload.*, bootloader.*,
//  build.*), in the same shape a board definition file would provide them.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::fmt;

use crate::config::Profile;
use crate::reset::ResetKind;

#[derive(Debug, Clone)]
pub struct Board {
    pub id:   &'static str,
    pub name: &'static str,
    keys:     &'static [(&'static str, &'static str)],
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

impl Board {
    /// Return the board catalog.
    pub fn catalog() -> &'static [Board] {
        BOARDS
    }

    /// Find a board by its short ID (case-insensitive).
    pub fn find(id: &str) -> Option<&'static Board> {
        BOARDS.iter().find(|b| b.id.eq_ignore_ascii_case(id))
    }

    pub fn profile(&self) -> Profile {
        Profile::from_pairs(self.keys)
    }

    pub fn key(&self, key: &str) -> Option<&'static str> {
        self.keys.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn mcu(&self) -> Option<&'static str> {
        self.key("build.mcu")
    }

    pub fn reset_kind(&self) -> ResetKind {
        ResetKind::of(&self.profile())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Static board table
// ─────────────────────────────────────────────────────────────────────────────

static BOARDS: &[Board] = &[
    Board {
        id: "uno", name: "Arduino Uno",
        keys: &[
            ("upload.protocol", "arduino"),
            ("upload.speed", "115200"),
            ("bootloader.low_fuses", "0xff"),
            ("bootloader.high_fuses", "0xde"),
            ("bootloader.extended_fuses", "0x05"),
            ("bootloader.path", "optiboot"),
            ("bootloader.file", "optiboot_atmega328.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x0F"),
            ("build.mcu", "atmega328p"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "nano", name: "Arduino Nano w/ ATmega328",
        keys: &[
            ("upload.protocol", "arduino"),
            ("upload.speed", "57600"),
            ("bootloader.low_fuses", "0xFF"),
            ("bootloader.high_fuses", "0xDA"),
            ("bootloader.extended_fuses", "0x05"),
            ("bootloader.path", "atmega"),
            ("bootloader.file", "ATmegaBOOT_168_atmega328.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x0F"),
            ("build.mcu", "atmega328p"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "mega2560", name: "Arduino Mega 2560",
        keys: &[
            ("upload.protocol", "stk500v2"),
            ("upload.speed", "115200"),
            ("bootloader.low_fuses", "0xFF"),
            ("bootloader.high_fuses", "0xD8"),
            ("bootloader.extended_fuses", "0xFD"),
            ("bootloader.path", "stk500v2"),
            ("bootloader.file", "stk500boot_v2_mega2560.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x0F"),
            ("build.mcu", "atmega2560"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "mega-adk", name: "Arduino Mega ADK",
        keys: &[
            ("upload.protocol", "stk500v2"),
            ("upload.speed", "115200"),
            ("bootloader.low_fuses", "0xFF"),
            ("bootloader.high_fuses", "0xD8"),
            ("bootloader.extended_fuses", "0xFD"),
            ("bootloader.path", "stk500v2"),
            ("bootloader.file", "stk500boot_v2_mega2560.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x0F"),
            ("build.mcu", "atmega2560"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "mega", name: "Arduino Mega (ATmega1280)",
        keys: &[
            ("upload.protocol", "arduino"),
            ("upload.speed", "57600"),
            ("bootloader.low_fuses", "0xFF"),
            ("bootloader.high_fuses", "0xDA"),
            ("bootloader.extended_fuses", "0xF5"),
            ("bootloader.path", "atmega"),
            ("bootloader.file", "ATmegaBOOT_168_atmega1280.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x0F"),
            ("build.mcu", "atmega1280"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "leonardo", name: "Arduino Leonardo",
        keys: &[
            ("upload.protocol", "avr109"),
            ("upload.speed", "57600"),
            ("upload.disable_flushing", "true"),
            ("bootloader.low_fuses", "0xff"),
            ("bootloader.high_fuses", "0xd8"),
            ("bootloader.extended_fuses", "0xcb"),
            ("bootloader.path", "caterina"),
            ("bootloader.file", "Caterina-Leonardo.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x2F"),
            ("build.mcu", "atmega32u4"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "micro", name: "Arduino Micro",
        keys: &[
            ("upload.protocol", "avr109"),
            ("upload.speed", "57600"),
            ("upload.disable_flushing", "true"),
            ("bootloader.low_fuses", "0xff"),
            ("bootloader.high_fuses", "0xd8"),
            ("bootloader.extended_fuses", "0xcb"),
            ("bootloader.path", "caterina"),
            ("bootloader.file", "Caterina-Micro.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x2F"),
            ("build.mcu", "atmega32u4"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "robot-control", name: "Arduino Robot Control",
        keys: &[
            ("upload.protocol", "avr109"),
            ("upload.speed", "57600"),
            ("upload.disable_flushing", "true"),
            ("bootloader.low_fuses", "0xff"),
            ("bootloader.high_fuses", "0xd8"),
            ("bootloader.extended_fuses", "0xcb"),
            ("bootloader.path", "caterina-Arduino_Robot"),
            ("bootloader.file", "Caterina-Robot-Control.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x2F"),
            ("build.mcu", "atmega32u4"),
            ("build.f_cpu", "16000000L"),
        ],
    },
    Board {
        id: "lilypadusb", name: "LilyPad Arduino USB",
        keys: &[
            ("upload.protocol", "avr109"),
            ("upload.speed", "57600"),
            ("upload.disable_flushing", "true"),
            ("bootloader.low_fuses", "0xff"),
            ("bootloader.high_fuses", "0xd8"),
            ("bootloader.extended_fuses", "0xce"),
            ("bootloader.path", "caterina-LilyPadUSB"),
            ("bootloader.file", "Caterina-LilyPadUSB.hex"),
            ("bootloader.unlock_bits", "0x3F"),
            ("bootloader.lock_bits", "0x2F"),
            ("build.mcu", "atmega32u4"),
            ("build.f_cpu", "8000000L"),
        ],
    },
];

// ─────────────────────────────────────────────────────────────────────────────
//  Programmers  (target "arduino")
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Programmer {
    pub id:   &'static str,
    pub name: &'static str,
    keys:     &'static [(&'static str, &'static str)],
}

impl Programmer {
    pub fn catalog() -> &'static [Programmer] {
        PROGRAMMERS
    }

    pub fn profile(&self) -> Profile {
        Profile::from_pairs(self.keys)
    }
}

static PROGRAMMERS: &[Programmer] = &[
    Programmer {
        id: "avrisp", name: "AVR ISP",
        keys: &[("communication", "serial"), ("protocol", "stk500v1")],
    },
    Programmer {
        id: "avrispmkii", name: "AVRISP mkII",
        keys: &[("communication", "usb"), ("protocol", "stk500v2")],
    },
    Programmer {
        id: "usbtinyisp", name: "USBtinyISP",
        keys: &[("protocol", "usbtiny")],
    },
    Programmer {
        id: "usbasp", name: "USBasp",
        keys: &[("communication", "usb"), ("protocol", "usbasp")],
    },
    Programmer {
        id: "parallel", name: "Parallel Programmer",
        keys: &[("communication", "dapa"), ("protocol", "dapa"), ("force", "true")],
    },
    Programmer {
        id: "arduinoisp", name: "Arduino as ISP",
        keys: &[("communication", "serial"), ("protocol", "stk500v1"), ("speed", "19200")],
    },
];

/// Programmer table of the built-in `arduino` target.
pub fn builtin_programmers() -> BTreeMap<String, Profile> {
    PROGRAMMERS.iter().map(|p| (p.id.to_owned(), p.profile())).collect()
}
