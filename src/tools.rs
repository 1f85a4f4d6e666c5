// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: tools  ·  locating avrdude and its config file
//
//  Linux
//    <hardware>/tools/avrdude + <hardware>/tools/avrdude.conf if bundled,
//    else the newest avrdude in the arduino-cli cache
//    (~/.arduino15/packages/arduino/tools/avrdude/<ver>/bin), else PATH.
//
//  macOS / Windows
//    <hardware>/tools/avr/bin/avrdude + <hardware>/tools/avr/etc/avrdude.conf
// ─────────────────────────────────────────────────────────────────────────────

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Prefix avrdude needs in front of a serial device name.
    pub fn port_prefix(self) -> &'static str {
        match self {
            Platform::Windows => r"\\.\",
            _ => "",
        }
    }
}

/// The leading part of every avrdude command line: the binary and,
/// when known, `-C<avrdude.conf>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPrefix {
    pub program: PathBuf,
    pub config:  Option<PathBuf>,
}

impl ToolPrefix {
    pub fn new(program: impl Into<PathBuf>, config: Option<PathBuf>) -> Self {
        ToolPrefix { program: program.into(), config }
    }

    pub fn locate(hardware: &Path, platform: Platform) -> Self {
        let tools = hardware.join("tools");

        match platform {
            Platform::Linux => {
                let bundled = tools.join("avrdude");
                if bundled.exists() {
                    return ToolPrefix::new(bundled, Some(tools.join("avrdude.conf")));
                }
                if let Some(bin) = find_in_arduino15_tools("avrdude") {
                    let conf = conf_next_to(&bin);
                    return ToolPrefix::new(bin, conf);
                }
                ToolPrefix::new("avrdude", None)
            }
            Platform::MacOs | Platform::Windows => ToolPrefix::new(
                tools.join("avr").join("bin").join("avrdude"),
                Some(tools.join("avr").join("etc").join("avrdude.conf")),
            ),
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut out = vec![self.program.to_string_lossy().into_owned()];
        if let Some(conf) = &self.config {
            out.push(format!("-C{}", conf.display()));
        }
        out
    }
}

/// Newest `<tool>` under the arduino-cli package cache.
fn find_in_arduino15_tools(tool: &str) -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let tools_dir = Path::new(&home)
        .join(".arduino15/packages/arduino/tools")
        .join(tool);

    let mut versions: Vec<String> = std::fs::read_dir(&tools_dir)
        .ok()?
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    versions.sort_by_key(|v| version_key(v));

    let bin = tools_dir.join(versions.last()?).join("bin").join(tool);
    bin.exists().then_some(bin)
}

/// Numeric runs of a version directory name, so `10.0` orders after `7.1`
/// and `6.3.0-arduino17` after `6.3.0-arduino9`.
fn version_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

fn conf_next_to(bin: &Path) -> Option<PathBuf> {
    let parent = bin.parent()?;
    [parent.join("../etc/avrdude.conf"), parent.join("avrdude.conf")]
        .into_iter()
        .find(|c| c.exists())
}
