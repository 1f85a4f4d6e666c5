// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: upload  ·  upload pipeline orchestrator
//
//    request → pick mode ─┬─ programmer  → connection flags → avrdude
//                         └─ bootloader  → [1200-baud reset + reacquire]
//                                        → flush → avrdude → [restore port]
//
//  Burning a bootloader is a separate entry point: erase + fuses, settle,
//  then the bootloader image and lock bits.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::avrdude::{self, ArgumentVector};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigSource, Profile, Settings};
use crate::error::Result;
use crate::executor::{AvrdudeRunner, ProcessExecutor};
use crate::ports::{PortEnumerator, PortToucher, SystemPorts};
use crate::reset::{self, ResetKind, ResetTiming, Restoration};
use crate::tools::{Platform, ToolPrefix};

/// Pause between the fuse write and the bootloader write of a burn.
const ERASE_SETTLE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Directory containing the compiled firmware.
    pub build_path:       PathBuf,
    /// Stem of `<name>.hex`.
    pub artifact_name:    String,
    /// Flash through the selected programmer instead of the bootloader.
    pub using_programmer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Programmer,
    Bootloader,
}

impl UploadMode {
    /// Boards without an upload protocol can only be programmed externally.
    pub fn select(board: &impl ConfigSource, using_programmer: bool) -> Self {
        if using_programmer || board.get("upload.protocol").is_none() {
            UploadMode::Programmer
        } else {
            UploadMode::Bootloader
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub success:     bool,
    pub mode:        UploadMode,
    /// Port avrdude wrote through (bootloader mode only).
    pub port:        Option<String>,
    pub args:        ArgumentVector,
    pub output:      String,
    /// Post-flash handling of reset-capable boards.
    pub restoration: Option<Restoration>,
}

#[derive(Debug, Clone)]
pub struct BurnOutcome {
    pub success:         bool,
    pub fuse_args:       ArgumentVector,
    /// `None` when the fuse write failed or there was no image to write.
    pub bootloader_args: Option<ArgumentVector>,
    pub output:          String,
}

pub struct Uploader<P, E, C> {
    settings: Settings,
    ports:    P,
    executor: E,
    clock:    C,
    tool:     ToolPrefix,
    platform: Platform,
    timing:   ResetTiming,
    verbose:  bool,
}

impl Uploader<SystemPorts, AvrdudeRunner, SystemClock> {
    /// Real serial ports, real avrdude, real sleeps.
    pub fn system(settings: Settings) -> Self {
        Self::new(settings, SystemPorts, AvrdudeRunner, SystemClock)
    }
}

impl<P, E, C> Uploader<P, E, C>
where
    P: PortEnumerator + PortToucher,
    E: ProcessExecutor,
    C: Clock,
{
    pub fn new(settings: Settings, ports: P, executor: E, clock: C) -> Self {
        let platform = Platform::current();
        let tool = ToolPrefix::locate(&settings.hardware, platform);
        Uploader {
            settings,
            ports,
            executor,
            clock,
            tool,
            platform,
            timing: ResetTiming::default(),
            verbose: false,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_tool(mut self, tool: ToolPrefix) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_timing(mut self, timing: ResetTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn is_verbose(&self) -> bool {
        self.verbose || self.settings.preferences.get_bool("upload.verbose")
    }

    /// Flash `<build_path>/<artifact_name>.hex`.
    ///
    /// `Ok` with `success == false` means avrdude ran and failed; `Err` means
    /// the upload was aborted before (or instead of) running it.
    pub fn upload(&mut self, req: &UploadRequest) -> Result<UploadOutcome> {
        let board = self.settings.board_profile()?;
        let image = avrdude::firmware_image(&req.build_path, &req.artifact_name);

        match UploadMode::select(&board, req.using_programmer) {
            UploadMode::Programmer => self.upload_with_programmer(&board, &image),
            UploadMode::Bootloader => self.upload_via_bootloader(&board, &image),
        }
    }

    /// Connection flags of the programmer named by the `programmer` preference.
    pub fn programmer_params(&self) -> Result<ArgumentVector> {
        let prefs = &self.settings.preferences;
        let name = prefs.require("programmer")?;
        let (target, id) = self.settings.targets.resolve("programmer", name, &self.settings.target)?;
        avrdude::programmer_args(target.programmer(id)?, prefs.get("serial.port"), self.platform)
    }

    fn upload_with_programmer(&mut self, board: &Profile, image: &Path) -> Result<UploadOutcome> {
        let mut params = self.programmer_params()?;
        params.push(avrdude::flash_write(image));
        let args = avrdude::command_line(&self.tool, self.is_verbose(), board, &params)?;

        let exec = self.executor.run(&args)?;
        Ok(UploadOutcome {
            success:     exec.success,
            mode:        UploadMode::Programmer,
            port:        None,
            args,
            output:      exec.output,
            restoration: None,
        })
    }

    fn upload_via_bootloader(&mut self, board: &Profile, image: &Path) -> Result<UploadOutcome> {
        let prefs = &self.settings.preferences;
        let selected = prefs.require("serial.port")?.to_owned();
        let verify = prefs.get_bool("upload.verify");
        let verbose = self.is_verbose();
        let reset_kind = ResetKind::of(board);

        let debug_rate = match reset_kind {
            ResetKind::CaterinaLike => {
                self.timing.validate()?;
                Some(prefs.get_integer("serial.debug_rate")?)
            }
            ResetKind::None => None,
        };

        // Assemble once against the selected port so configuration errors
        // surface before the board is reset.
        let params = avrdude::bootloader_args(board, &selected, verify, image, self.platform)?;
        let mut args = avrdude::command_line(&self.tool, verbose, board, &params)?;

        let port = match reset_kind {
            ResetKind::CaterinaLike => {
                let port = reset::reacquire(&mut self.ports, &mut self.clock, &selected, self.timing)?;
                if port != selected {
                    let params = avrdude::bootloader_args(board, &port, verify, image, self.platform)?;
                    args = avrdude::command_line(&self.tool, verbose, board, &params)?;
                }
                port
            }
            ResetKind::None => selected.clone(),
        };

        let flush = board
            .get("upload.disable_flushing")
            .map_or(true, |v| v.eq_ignore_ascii_case("false"));
        if flush {
            self.ports.flush(&port)?;
        }

        let exec = self.executor.run(&args)?;

        // The sketch comes back on the selected port, not the bootloader's.
        let restoration = match debug_rate {
            Some(baud) if exec.success => Some(reset::restore(
                &mut self.ports,
                &mut self.clock,
                &selected,
                baud,
                self.timing,
            )),
            _ => None,
        };

        Ok(UploadOutcome {
            success: exec.success,
            mode: UploadMode::Bootloader,
            port: Some(port),
            args,
            output: exec.output,
            restoration,
        })
    }

    /// Burn the board's bootloader through the selected programmer.
    pub fn burn_bootloader(&mut self) -> Result<BurnOutcome> {
        let params = self.programmer_params()?;
        self.burn_bootloader_with(&params)
    }

    /// Burn the board's bootloader using arbitrary connection flags.
    pub fn burn_bootloader_with(&mut self, connection: &[String]) -> Result<BurnOutcome> {
        let board = self.settings.board_profile()?;
        let verbose = self.is_verbose();

        let mut fuse_params = connection.to_vec();
        fuse_params.extend(avrdude::fuse_args(&board)?);
        let image_writes = avrdude::bootloader_image_args(&board, &self.settings.targets, &self.settings.target)?;

        let fuse_args = avrdude::command_line(&self.tool, verbose, &board, &fuse_params)?;
        let first = self.executor.run(&fuse_args)?;

        let mut outcome = BurnOutcome {
            success: first.success,
            fuse_args,
            bootloader_args: None,
            output: first.output,
        };
        if !first.success {
            return Ok(outcome);
        }

        self.clock.sleep(ERASE_SETTLE);

        if image_writes.is_empty() {
            return Ok(outcome);
        }

        let mut image_params = connection.to_vec();
        image_params.extend(image_writes);
        let image_args = avrdude::command_line(&self.tool, verbose, &board, &image_params)?;
        let second = self.executor.run(&image_args)?;

        outcome.success = second.success;
        if !second.output.is_empty() {
            outcome.output = format!("{}\n{}", outcome.output, second.output).trim().to_owned();
        }
        outcome.bootloader_args = Some(image_args);
        Ok(outcome)
    }
}
