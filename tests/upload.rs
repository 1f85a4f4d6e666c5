mod common;

use std::time::Duration;

use common::{settings, strings, Bench, Event};
use pretty_assertions::assert_eq;

use avr_upload::{ResetTiming, Restoration, UploadError, UploadMode, UploadRequest};

fn request(using_programmer: bool) -> UploadRequest {
    UploadRequest {
        build_path:       "/tmp/build".into(),
        artifact_name:    "blink".into(),
        using_programmer,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Bootloader mode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn direct_upload_through_serial_bootloader() {
    let bench = Bench::new();
    let s = settings(
        r#"
        [preferences]
        serial.port = "COM5"

        [board]
        upload.protocol = "arduino"
        upload.speed = "115200"
        build.mcu = "atmega328p"
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(false)).unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.mode, UploadMode::Bootloader);
    assert_eq!(outcome.port.as_deref(), Some("COM5"));
    assert_eq!(outcome.restoration, None);
    assert_eq!(
        outcome.args,
        strings(&[
            "avrdude",
            "-C/hw/avrdude.conf",
            "-q",
            "-q",
            "-patmega328p",
            "-carduino",
            "-PCOM5",
            "-b115200",
            "-D",
            "-Uflash:w:/tmp/build/blink.hex:i",
        ])
    );

    // no reset dance, but the buffer is flushed before avrdude runs
    assert_eq!(
        bench.events(),
        vec![
            Event::Flush { port: "COM5".into(), at: 0 },
            Event::Run { args: outcome.args.clone(), at: 0 },
        ]
    );
}

#[test]
fn disabled_flushing_skips_the_flush() {
    let bench = Bench::new();
    let s = settings(
        r#"
        [preferences]
        serial.port = "/dev/ttyUSB0"
        upload.verify = false

        [board]
        upload.protocol = "stk500"
        upload.speed = 57600
        upload.disable_flushing = "TRUE"
        build.mcu = "atmega168"
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(false)).unwrap();

    assert!(outcome.args.contains(&"-cstk500v1".to_owned()));
    assert!(outcome.args.contains(&"-V".to_owned()));
    assert!(!bench.events().iter().any(|e| matches!(e, Event::Flush { .. })));
}

#[test]
fn leonardo_is_reset_and_found_on_a_new_port() {
    let bench = Bench::new()
        .ports_from(0, &["/dev/ttyACM0"])
        .ports_from(1, &[])
        .ports_from(750, &["/dev/ttyACM1"])
        .ports_from(1000, &[])
        .ports_from(1300, &["/dev/ttyACM0"]);
    let s = settings(
        r#"
        preset = "leonardo"
        [preferences]
        serial.port = "/dev/ttyACM0"
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(false)).unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.port.as_deref(), Some("/dev/ttyACM1"));
    assert!(outcome.args.contains(&"-P/dev/ttyACM1".to_owned()));
    assert!(outcome.args.contains(&"-cavr109".to_owned()));
    assert_eq!(
        outcome.restoration,
        Some(Restoration::Restored { port: "/dev/ttyACM0".into(), baud: 9600 })
    );
    assert_eq!(
        bench.touches(),
        vec![("/dev/ttyACM0".to_owned(), 1200), ("/dev/ttyACM0".to_owned(), 9600)]
    );

    let events = bench.events();
    let run_at = events
        .iter()
        .find_map(|e| match e {
            Event::Run { at, .. } => Some(*at),
            _ => None,
        })
        .unwrap();
    assert_eq!(run_at, 750);

    // first scan after the flash happens only after the 500 ms settle
    let first_scan_after = events
        .iter()
        .skip_while(|e| !matches!(e, Event::Run { .. }))
        .find_map(|e| match e {
            Event::List { at } => Some(*at),
            _ => None,
        })
        .unwrap();
    assert!(first_scan_after >= run_at + 500);

    // leonardo disables flushing
    assert!(!events.iter().any(|e| matches!(e, Event::Flush { .. })));
}

#[test]
fn reset_board_never_reappearing_fails_before_flashing() {
    let bench = Bench::new().ports_from(0, &["/dev/ttyACM0"]).ports_from(1, &[]);
    let s = settings(
        r#"
        preset = "micro"
        [preferences]
        serial.port = "/dev/ttyACM0"
        "#,
    );

    let err = bench.uploader(s).upload(&request(false)).unwrap_err();

    match err {
        UploadError::DeviceNotFound { port, elapsed_ms } => {
            assert_eq!(port, "/dev/ttyACM0");
            assert_eq!(elapsed_ms, 10_000);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(bench.runs().is_empty());
    assert_eq!(bench.now(), 10_000);
}

#[test]
fn failed_reset_touch_aborts_before_flashing() {
    let bench = Bench::new().ports_from(0, &["/dev/ttyACM0"]).failing_touch();
    let s = settings(
        r#"
        preset = "leonardo"
        [preferences]
        serial.port = "/dev/ttyACM0"
        "#,
    );

    let err = bench.uploader(s).upload(&request(false)).unwrap_err();

    match err {
        UploadError::PortAccess { port, .. } => assert_eq!(port, "/dev/ttyACM0"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(bench.touches(), vec![("/dev/ttyACM0".to_owned(), 1200)]);
    assert!(bench.runs().is_empty());
}

#[test]
fn failed_port_listing_aborts_before_flashing() {
    let bench = Bench::new().failing_list();
    let s = settings(
        r#"
        preset = "leonardo"
        [preferences]
        serial.port = "/dev/ttyACM0"
        "#,
    );

    let err = bench.uploader(s).upload(&request(false)).unwrap_err();

    assert!(matches!(err, UploadError::PortEnumeration(_)), "{:?}", err);
    assert!(bench.touches().is_empty());
    assert!(bench.runs().is_empty());
}

#[test]
fn failed_flush_aborts_before_flashing() {
    let bench = Bench::new().failing_touch();
    let s = settings(
        r#"
        preset = "uno"
        [preferences]
        serial.port = "/dev/ttyUSB0"
        "#,
    );

    let err = bench.uploader(s).upload(&request(false)).unwrap_err();

    assert!(matches!(err, UploadError::PortAccess { .. }), "{:?}", err);
    assert!(bench.runs().is_empty());
}

#[test]
fn zero_poll_interval_is_a_config_error() {
    let bench = Bench::new().ports_from(0, &["/dev/ttyACM0"]);
    let s = settings(
        r#"
        preset = "leonardo"
        [preferences]
        serial.port = "/dev/ttyACM0"
        "#,
    );
    let timing = ResetTiming { poll_interval: Duration::ZERO, ..ResetTiming::default() };

    let err = bench.uploader(s).with_timing(timing).upload(&request(false)).unwrap_err();

    assert!(err.is_config(), "{:?}", err);
    assert!(bench.events().is_empty());
}

#[test]
fn failed_flash_skips_port_restoration() {
    let bench = Bench::new()
        .ports_from(0, &["COM3"])
        .ports_from(1, &["COM4"])
        .tool_results(&[false])
        .tool_output("avrdude: stk500_recv(): programmer is not responding");
    let s = settings(
        r#"
        preset = "lilypadusb"
        [preferences]
        serial.port = "COM3"
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(false)).unwrap();

    assert!(!outcome.success);
    assert!(outcome.output.contains("not responding"));
    assert_eq!(outcome.port.as_deref(), Some("COM4"));
    assert_eq!(outcome.restoration, None);
    assert_eq!(bench.touches(), vec![("COM3".to_owned(), 1200)]);
    assert!(matches!(bench.events().last(), Some(Event::Run { .. })));
}

#[test]
fn sketch_without_serial_is_not_an_error() {
    let bench = Bench::new()
        .ports_from(0, &["/dev/ttyACM0"])
        .ports_from(1, &["/dev/ttyACM1"])
        .ports_from(300, &[]);
    let s = settings(
        r#"
        preset = "robot-control"
        [preferences]
        serial.port = "/dev/ttyACM0"
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(false)).unwrap();

    assert!(outcome.success);
    assert_eq!(
        outcome.restoration,
        Some(Restoration::NotReturned { port: "/dev/ttyACM0".into() })
    );
}

#[test]
fn config_errors_abort_before_touching_the_board() {
    let bench = Bench::new().ports_from(0, &["/dev/ttyACM0"]);
    let s = settings(
        r#"
        [preferences]
        serial.port = "/dev/ttyACM0"

        [board]
        upload.protocol = "avr109"
        upload.speed = "57600"
        bootloader.path = "caterina"
        "#,
    );

    let err = bench.uploader(s).upload(&request(false)).unwrap_err();

    assert!(matches!(err, UploadError::Config { ref key, .. } if key == "build.mcu"));
    assert!(bench.events().is_empty());
}

#[test]
fn upload_verbose_preference_switches_to_four_v() {
    let bench = Bench::new();
    let s = settings(
        r#"
        preset = "uno"
        [preferences]
        serial.port = "/dev/ttyUSB0"
        upload.verbose = true
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(false)).unwrap();

    assert_eq!(&outcome.args[2..7], &strings(&["-v", "-v", "-v", "-v", "-patmega328p"])[..]);
}

// ─────────────────────────────────────────────────────────────────────────────
//  Programmer mode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn board_without_protocol_uses_the_programmer() {
    let bench = Bench::new();
    let s = settings(
        r#"
        [preferences]
        programmer = "arduino:usbasp"

        [board]
        build.mcu = "attiny85"
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(false)).unwrap();

    assert_eq!(outcome.mode, UploadMode::Programmer);
    assert_eq!(
        outcome.args,
        strings(&[
            "avrdude",
            "-C/hw/avrdude.conf",
            "-q",
            "-q",
            "-pattiny85",
            "-cusbasp",
            "-Pusb",
            "-Uflash:w:/tmp/build/blink.hex:i",
        ])
    );
    // programmers never go through the reset dance
    assert_eq!(bench.events().len(), 1);
}

#[test]
fn serial_programmer_from_a_custom_target() {
    let bench = Bench::new();
    let s = settings(
        r#"
        preset = "uno"

        [preferences]
        serial.port = "/dev/ttyUSB1"
        programmer = "tiny:isp"

        [targets.tiny.programmers.isp]
        protocol = "stk500v1"
        communication = "serial"
        speed = 19200
        delay = 5
        "#,
    );

    let outcome = bench.uploader(s).upload(&request(true)).unwrap();

    assert_eq!(outcome.mode, UploadMode::Programmer);
    assert_eq!(
        &outcome.args[5..],
        &strings(&[
            "-cstk500v1",
            "-P/dev/ttyUSB1",
            "-b19200",
            "-i5",
            "-Uflash:w:/tmp/build/blink.hex:i",
        ])[..]
    );
}

#[test]
fn unknown_programmer_is_a_config_error() {
    let bench = Bench::new();
    let s = settings(
        r#"
        preset = "uno"
        [preferences]
        programmer = "jtagice3"
        "#,
    );

    let err = bench.uploader(s).upload(&request(true)).unwrap_err();
    assert!(common::is_config(&err));
    assert!(bench.events().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
//  Burn bootloader
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn burn_writes_fuses_then_bootloader() {
    let bench = Bench::new();
    let s = settings(
        r#"
        preset = "uno"
        [preferences]
        programmer = "usbasp"
        "#,
    );

    let outcome = bench.uploader(s).burn_bootloader().unwrap();

    assert!(outcome.success);
    let runs = bench.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(
        &runs[0][4..],
        &strings(&[
            "-patmega328p",
            "-cusbasp",
            "-Pusb",
            "-e",
            "-Ulock:w:0x3F:m",
            "-Uefuse:w:0x05:m",
            "-Uhfuse:w:0xde:m",
            "-Ulfuse:w:0xff:m",
        ])[..]
    );
    assert!(!runs[0].contains(&"-D".to_owned()));
    assert_eq!(
        &runs[1][4..],
        &strings(&[
            "-patmega328p",
            "-cusbasp",
            "-Pusb",
            "-Uflash:w:/hw/arduino/bootloaders/optiboot/optiboot_atmega328.hex:i",
            "-Ulock:w:0x0F:m",
        ])[..]
    );
    assert_eq!(outcome.bootloader_args.as_ref(), Some(&runs[1]));

    // one second between the erase and the bootloader write
    let events = bench.events();
    assert!(matches!(events[1], Event::Sleep { ms: 1000 }));
    assert!(matches!(events[2], Event::Run { at: 1000, .. }));
}

#[test]
fn burn_without_bootloader_image_writes_fuses_only() {
    let bench = Bench::new();
    let s = settings(
        r#"
        [board]
        build.mcu = "attiny85"
        bootloader.high_fuses = "0xdf"
        bootloader.low_fuses = "0x62"
        "#,
    );
    let connection = strings(&["-cusbtiny"]);

    let outcome = bench.uploader(s).burn_bootloader_with(&connection).unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.bootloader_args, None);
    assert_eq!(bench.runs().len(), 1);
    assert_eq!(
        &outcome.fuse_args[4..],
        &strings(&["-pattiny85", "-cusbtiny", "-e", "-Uhfuse:w:0xdf:m", "-Ulfuse:w:0x62:m"])[..]
    );
}

#[test]
fn failed_fuse_write_stops_the_burn() {
    let bench = Bench::new().tool_results(&[false]);
    let s = settings(r#"preset = "leonardo""#);

    let outcome = bench.uploader(s).burn_bootloader().unwrap();

    assert!(!outcome.success);
    assert_eq!(bench.runs().len(), 1);
    assert!(!bench.events().iter().any(|e| matches!(e, Event::Sleep { .. })));
}

#[test]
fn burn_requires_both_fuses() {
    let bench = Bench::new();
    let s = settings(
        r#"
        [board]
        build.mcu = "attiny85"
        bootloader.high_fuses = "0xdf"
        "#,
    );

    let err = bench.uploader(s).burn_bootloader_with(&strings(&["-cusbtiny"])).unwrap_err();
    assert!(matches!(err, UploadError::Config { ref key, .. } if key == "bootloader.low_fuses"));
    assert!(bench.runs().is_empty());
}
