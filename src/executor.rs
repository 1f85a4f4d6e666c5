// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: executor  ·  runs the flashing tool
// ─────────────────────────────────────────────────────────────────────────────

use std::process::Command;

use crate::error::{Result, UploadError};

/// Result of one tool run. A failed flash is an ordinary outcome, not an
/// error: wrong fuses, no device or a checksum mismatch all end up here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    pub success: bool,
    /// Combined stderr + stdout.
    pub output:  String,
}

pub trait ProcessExecutor {
    /// Run `args[0]` with the remaining arguments and wait for it to finish.
    fn run(&mut self, args: &[String]) -> Result<ExecOutcome>;
}

impl<T: ProcessExecutor + ?Sized> ProcessExecutor for &mut T {
    fn run(&mut self, args: &[String]) -> Result<ExecOutcome> {
        (**self).run(args)
    }
}

/// Blocking `std::process::Command` runner.
#[derive(Debug, Default, Clone, Copy)]
pub struct AvrdudeRunner;

impl ProcessExecutor for AvrdudeRunner {
    fn run(&mut self, args: &[String]) -> Result<ExecOutcome> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| UploadError::invalid("command", "empty argument vector"))?;

        log::debug!("{}", args.join(" "));

        let out = Command::new(program)
            .args(rest)
            .output()
            .map_err(|source| UploadError::ToolLaunch { program: program.clone(), source })?;

        let stderr = String::from_utf8_lossy(&out.stderr);
        let stdout = String::from_utf8_lossy(&out.stdout);

        Ok(ExecOutcome {
            success: out.status.success(),
            output:  format!("{}\n{}", stderr, stdout).trim().to_owned(),
        })
    }
}
