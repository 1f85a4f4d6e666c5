// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: avrdude  ·  argument vector assembly
//
//  Every command line has the same shape; order matters to avrdude:
//
//    <avrdude> -C<conf>  -v -v -v -v | -q -q  -p<mcu>
//      -c<protocol>  -Pusb | -P<port>  [-b<baud>]  [-D]  [-V]  [-F]  [-i<delay>]
//      -U<mem>:w:<file|value>:<fmt> …
//
//  Everything here is pure: port resolution and tool discovery happen before.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::{Path, PathBuf};

use crate::config::{ConfigSource, TargetTable};
use crate::error::{Result, UploadError};
use crate::tools::{Platform, ToolPrefix};

pub type ArgumentVector = Vec<String>;

/// `<build_path>/<name>.hex`
pub fn firmware_image(build_path: &Path, name: &str) -> PathBuf {
    build_path.join(format!("{}.hex", name))
}

pub fn flash_write(image: &Path) -> String {
    format!("-Uflash:w:{}:i", image.display())
}

/// avrdude calls the original STK500 protocol `stk500v1`.
pub fn normalize_protocol(protocol: &str) -> &str {
    if protocol == "stk500" {
        "stk500v1"
    } else {
        protocol
    }
}

pub fn port_flag(port: &str, platform: Platform) -> String {
    format!("-P{}{}", platform.port_prefix(), port)
}

/// Full command line: tool prefix, verbosity block, `-p<mcu>`, then `params`.
pub fn command_line(
    tool:    &ToolPrefix,
    verbose: bool,
    board:   &impl ConfigSource,
    params:  &[String],
) -> Result<ArgumentVector> {
    let mcu = board.require("build.mcu")?;

    let mut args = tool.args();
    if verbose {
        args.extend(["-v", "-v", "-v", "-v"].map(String::from));
    } else {
        args.extend(["-q", "-q"].map(String::from));
    }
    args.push(format!("-p{}", mcu));
    args.extend_from_slice(params);
    Ok(args)
}

/// Connection flags for an external programmer.
///
/// `serial_port` is the configured port; it is only needed when the
/// programmer talks over a serial line.
pub fn programmer_args(
    programmer:  &impl ConfigSource,
    serial_port: Option<&str>,
    platform:    Platform,
) -> Result<ArgumentVector> {
    let mut params = vec![format!("-c{}", programmer.require("protocol")?)];

    match programmer.get("communication") {
        Some("usb") => params.push("-Pusb".into()),
        Some("serial") => {
            let port = serial_port.ok_or_else(|| UploadError::missing("serial.port"))?;
            params.push(port_flag(port, platform));
            if programmer.get("speed").is_some() {
                params.push(format!("-b{}", programmer.get_integer("speed")?));
            }
        }
        // parallel programmers: avrdude's default port address works
        _ => {}
    }

    if programmer.get_bool("force") {
        params.push("-F".into());
    }
    if let Some(delay) = programmer.get("delay") {
        params.push(format!("-i{}", delay));
    }

    Ok(params)
}

/// Connection and write flags for an upload through the board's resident
/// bootloader. `port` is the already-resolved upload port.
pub fn bootloader_args(
    board:    &impl ConfigSource,
    port:     &str,
    verify:   bool,
    image:    &Path,
    platform: Platform,
) -> Result<ArgumentVector> {
    let protocol = normalize_protocol(board.require("upload.protocol")?);

    let mut params = vec![
        format!("-c{}", protocol),
        port_flag(port, platform),
        format!("-b{}", board.get_integer("upload.speed")?),
        "-D".into(), // don't erase
    ];
    if !verify {
        params.push("-V".into());
    }
    params.push(flash_write(image));
    Ok(params)
}

/// First half of a bootloader burn: chip erase plus fuse writes.
pub fn fuse_args(board: &impl ConfigSource) -> Result<ArgumentVector> {
    let mut fuses = vec!["-e".to_owned()];

    if let Some(unlock) = board.get("bootloader.unlock_bits") {
        fuses.push(format!("-Ulock:w:{}:m", unlock));
    }
    if let Some(efuse) = board.get("bootloader.extended_fuses") {
        fuses.push(format!("-Uefuse:w:{}:m", efuse));
    }
    fuses.push(format!("-Uhfuse:w:{}:m", board.require("bootloader.high_fuses")?));
    fuses.push(format!("-Ulfuse:w:{}:m", board.require("bootloader.low_fuses")?));
    Ok(fuses)
}

/// Second half of a bootloader burn: the bootloader image and lock bits.
///
/// `bootloader.path` may be `target:relative/path` to take the image from
/// another family's `bootloaders/` folder. An empty result means there is
/// nothing to write.
pub fn bootloader_image_args(
    board:   &impl ConfigSource,
    targets: &TargetTable,
    current: &str,
) -> Result<ArgumentVector> {
    let mut writes = Vec::new();

    if let Some(path) = board.get("bootloader.path") {
        let (target, relative) = targets.resolve("bootloader.path", path, current)?;
        let file = board.require("bootloader.file")?;
        let image = target.bootloaders_dir().join(relative).join(file);
        writes.push(flash_write(&image));
    }
    if let Some(lock) = board.get("bootloader.lock_bits") {
        writes.push(format!("-Ulock:w:{}:m", lock));
    }

    Ok(writes)
}
