// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload  ·  avrdude upload front-end
//
//  Builds the avrdude command line from board / programmer settings, resets
//  USB-CDC boards into their bootloader with the 1200-baud touch and tracks
//  the port they come back on.
//
//  USAGE
//  ─────
//    avr-upload upload  --board leonardo --port /dev/ttyACM0 --build-dir build --name blink
//    avr-upload upload  --board uno --using-programmer --programmer usbasp --build-dir build --name blink
//    avr-upload burn-bootloader --board uno --programmer arduinoisp --port /dev/ttyUSB0
//    avr-upload ports [--json]
//    avr-upload boards
//    avr-upload programmers
// ─────────────────────────────────────────────────────────────────────────────

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use avr_upload::config::DEFAULT_TARGET;
use avr_upload::ports;
use avr_upload::{
    Board, ConfigSource, Programmer, Restoration, Result, Settings, UploadError, UploadRequest,
    Uploader,
};

// ─────────────────────────────────────────────────────────────────────────────
//  CLI definition (clap derive)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "avr-upload",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Upload firmware to AVR boards through avrdude",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Settings file  (default: ./avr-upload.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Verbose avrdude output and debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Upload a compiled .hex to a connected board
    Upload(UploadArgs),
    /// Erase the chip, write the fuses and burn the board's bootloader
    BurnBootloader(TargetArgs),
    /// List serial ports and the boards recognised on them
    Ports {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List built-in boards
    Boards,
    /// List built-in programmers
    Programmers,
}

#[derive(Args)]
struct TargetArgs {
    /// Built-in board ID (replaces the preset and [board] table of the settings file)
    #[arg(long, short = 'b')]
    board: Option<String>,

    /// Serial port  (auto-detect if neither given nor configured)
    #[arg(long, short = 'p')]
    port: Option<String>,

    /// Programmer, optionally target-qualified  (e.g. "arduino:usbasp")
    #[arg(long)]
    programmer: Option<String>,
}

#[derive(Args)]
struct UploadArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Directory containing the compiled firmware
    #[arg(long)]
    build_dir: PathBuf,

    /// Firmware name  (uploads <build-dir>/<name>.hex)
    #[arg(long)]
    name: String,

    /// Flash through the programmer instead of the bootloader
    #[arg(long)]
    using_programmer: bool,

    /// Skip avrdude's read-back verification
    #[arg(long)]
    no_verify: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
//  Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let level = if cli.verbose { "debug" } else if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Cmd::Upload(ref args)         => cmd_upload(&cli, args),
        Cmd::BurnBootloader(ref args) => cmd_burn(&cli, args),
        Cmd::Ports { json }           => cmd_ports(json),
        Cmd::Boards                   => { cmd_boards(); Ok(()) }
        Cmd::Programmers              => { cmd_programmers(); Ok(()) }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_upload(cli: &Cli, args: &UploadArgs) -> Result<()> {
    let mut settings = load_settings(cli)?;
    apply_target_args(&mut settings, &args.target, cli.quiet)?;
    if args.no_verify {
        settings.preferences.insert("upload.verify", "false");
    }

    let port = settings.preferences.get("serial.port").unwrap_or("-").to_owned();
    if !cli.quiet {
        println!(
            "{} {} {}",
            "Uploading".cyan().bold(),
            format!("[board: {}]", settings.preset.as_deref().unwrap_or("custom")).dimmed(),
            format!("[port: {}]", port).dimmed(),
        );
        println!("{}", "─".repeat(60).dimmed());
    }

    let t0 = Instant::now();
    let req = UploadRequest {
        build_path:       args.build_dir.clone(),
        artifact_name:    args.name.clone(),
        using_programmer: args.using_programmer,
    };

    let outcome = match Uploader::system(settings).verbose(cli.verbose).upload(&req) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprint!("{}", upload_error_report(&e, &port));
            std::process::exit(1);
        }
    };

    if cli.verbose && !outcome.output.is_empty() {
        println!("{}", outcome.output.dimmed());
    }

    if !outcome.success {
        render_tool_failure(&outcome.output, outcome.port.as_deref().unwrap_or(&port));
        std::process::exit(1);
    }

    if !cli.quiet {
        let target = outcome.port.as_deref().unwrap_or("programmer");
        println!(
            "{} firmware uploaded via {} in {:.2}s",
            "✓".green().bold(),
            target.bold(),
            t0.elapsed().as_secs_f64()
        );
    }

    match outcome.restoration {
        Some(Restoration::NotReturned { port }) => {
            eprintln!("{} {} did not come back after the upload; the sketch may not use serial", "!".yellow(), port);
        }
        Some(Restoration::TouchFailed { port, reason }) => {
            eprintln!("{} could not reopen {}: {}", "!".yellow(), port, reason);
        }
        Some(Restoration::Restored { .. }) | None => {}
    }

    Ok(())
}

fn cmd_burn(cli: &Cli, args: &TargetArgs) -> Result<()> {
    let mut settings = load_settings(cli)?;
    apply_target_args(&mut settings, args, cli.quiet)?;

    if !cli.quiet {
        println!(
            "{} {} {}",
            "Burning bootloader".cyan().bold(),
            format!("[board: {}]", settings.preset.as_deref().unwrap_or("custom")).dimmed(),
            format!("[programmer: {}]", settings.preferences.get("programmer").unwrap_or("-")).dimmed(),
        );
        println!("{}", "─".repeat(60).dimmed());
    }

    let outcome = Uploader::system(settings).verbose(cli.verbose).burn_bootloader()?;

    if cli.verbose && !outcome.output.is_empty() {
        println!("{}", outcome.output.dimmed());
    }
    if !outcome.success {
        render_tool_failure(&outcome.output, "programmer");
        std::process::exit(1);
    }
    if !cli.quiet {
        let what = if outcome.bootloader_args.is_some() { "fuses and bootloader" } else { "fuses" };
        println!("{} {} written", "✓".green().bold(), what);
    }
    Ok(())
}

fn cmd_ports(json: bool) -> Result<()> {
    let ports = ports::detect_all()?;

    if json {
        let text = serde_json::to_string_pretty(&ports)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        println!("{}", text);
        return Ok(());
    }

    if ports.is_empty() {
        println!("{} No serial ports found", "!".yellow());
        return Ok(());
    }

    println!("{:<20} {:<15} {:<10} {}", "PORT", "BOARD", "VID:PID", "NAME");
    println!("{}", "─".repeat(70).dimmed());

    for p in &ports {
        let vid_pid = p.vid_pid
            .map(|(v, p)| format!("{:04X}:{:04X}", v, p))
            .unwrap_or_else(|| "—".into());
        println!(
            "{:<20} {:<15} {:<10} {}",
            p.port,
            p.board_id.unwrap_or("unknown"),
            vid_pid,
            p.board_name.unwrap_or("—"),
        );
    }
    Ok(())
}

fn cmd_boards() {
    println!("{:<15} {:<32} {:<12} {:<10} {:<24} {}",
        "ID", "NAME", "MCU", "PROTOCOL", "BOOTLOADER", "RESET");
    println!("{}", "─".repeat(100).dimmed());

    for b in Board::catalog() {
        let reset = match b.reset_kind() {
            avr_upload::ResetKind::CaterinaLike => "1200bps",
            avr_upload::ResetKind::None         => "—",
        };
        println!("{:<15} {:<32} {:<12} {:<10} {:<24} {}",
            b.id.bold(), b.name,
            b.mcu().unwrap_or("?"),
            b.key("upload.protocol").unwrap_or("—"),
            b.key("bootloader.path").unwrap_or("—"),
            reset.dimmed());
    }
}

fn cmd_programmers() {
    println!("{:<12} {:<22} {:<10} {}", "ID", "NAME", "PROTOCOL", "COMMUNICATION");
    println!("{}", "─".repeat(60).dimmed());

    for p in Programmer::catalog() {
        let profile = p.profile();
        println!("{:<12} {:<22} {:<10} {}",
            format!("{}:{}", DEFAULT_TARGET, p.id).bold(), p.name,
            profile.get("protocol").unwrap_or("?"),
            profile.get("communication").unwrap_or("—"));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.config {
        Some(path) => Settings::load(path),
        None       => Settings::load_default(),
    }
}

fn apply_target_args(settings: &mut Settings, args: &TargetArgs, quiet: bool) -> Result<()> {
    if let Some(id) = &args.board {
        Board::find(id).ok_or_else(|| UploadError::invalid("board", format!("unknown board '{}'", id)))?;
        settings.preset = Some(id.clone());
        settings.board = Default::default();
    }
    if let Some(programmer) = &args.programmer {
        settings.preferences.insert("programmer", programmer.clone());
    }

    match &args.port {
        Some(port) => settings.preferences.insert("serial.port", port.clone()),
        None if settings.preferences.get("serial.port").is_none() => {
            if let Some(port) = detect_port(quiet)? {
                settings.preferences.insert("serial.port", port);
            }
        }
        None => {}
    }
    Ok(())
}

fn detect_port(quiet: bool) -> Result<Option<String>> {
    if !quiet {
        print!("{} auto-detecting board… ", "→".cyan());
    }
    let found = ports::best_port()?;
    if !quiet {
        match &found {
            Some(p) => println!("{}", p.bold()),
            None    => println!("{}", "none".dimmed()),
        }
    }
    Ok(found)
}

// ─────────────────────────────────────────────────────────────────────────────
//  Error rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Full report for an upload aborted before avrdude finished. The caller
/// prints it and exits; nothing else prints the error.
fn upload_error_report(e: &UploadError, port: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{} {}", "UploadError".red().bold(), format!("upload to {} aborted", port));
    let _ = writeln!(out, "{}", "─".repeat(60).dimmed());

    match e {
        UploadError::DeviceNotFound { port, elapsed_ms } => {
            let _ = writeln!(out, "  {} no bootloader port appeared within {} ms", "✗".red(), elapsed_ms);
            let _ = writeln!(out, "  Selected port: {}", port.yellow());
            let _ = writeln!(out, "  • Check that the correct port is selected");
            let _ = writeln!(out, "  • Press the board's reset button right after starting the upload");
        }
        UploadError::Config { key, reason } => {
            let _ = writeln!(out, "  {} '{}': {}", "✗".red(), key.bold(), reason);
            let _ = writeln!(out, "  Set it in avr-upload.toml or pass it on the command line");
        }
        _ => {
            let _ = writeln!(out, "  {}", e);
        }
    }

    let _ = writeln!(out, "{}", "─".repeat(60).dimmed());
    out
}

fn render_tool_failure(output: &str, port: &str) {
    eprintln!("\n{} {}", "FlashError".red().bold(), format!("avrdude failed on {}", port));
    eprintln!("{}", "─".repeat(60).dimmed());

    for line in output.lines() {
        if line.to_lowercase().contains("error") {
            eprintln!("  {}", line.red());
        } else if !line.trim().is_empty() {
            eprintln!("  {}", line.dimmed());
        }
    }
    eprintln!();
    eprintln!("  {}", "Hints:".bold());
    eprintln!("  • Ensure the board is connected and in bootloader mode");
    eprintln!("  • Try a different USB cable / port");
    eprintln!("  • Pass --port explicitly: avr-upload upload --port /dev/ttyACM0 …");

    eprintln!("{}", "─".repeat(60).dimmed());
}
