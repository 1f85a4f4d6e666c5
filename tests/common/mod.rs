#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use avr_upload::{
    Clock, ExecOutcome, Platform, PortEnumerator, PortSnapshot, PortToucher, ProcessExecutor,
    Result, Settings, ToolPrefix, UploadError, Uploader,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    List { at: u64 },
    Touch { port: String, baud: u32, at: u64 },
    Flush { port: String, at: u64 },
    Run { args: Vec<String>, at: u64 },
    Sleep { ms: u64 },
}

#[derive(Default)]
struct State {
    now_ms:    u64,
    events:    Vec<Event>,
    /// (from_ms, ports visible from then on)
    timeline:  Vec<(u64, PortSnapshot)>,
    results:   VecDeque<bool>,
    output:    String,
    fail_list:  bool,
    fail_touch: bool,
}

/// One fake standing in for the serial ports, the clock and avrdude, so
/// every interaction lands on a single timeline.
#[derive(Clone, Default)]
pub struct Bench(Rc<RefCell<State>>);

impl Bench {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports visible from `from_ms` until the next entry.
    pub fn ports_from(self, from_ms: u64, ports: &[&str]) -> Self {
        self.0.borrow_mut().timeline.push((from_ms, ports.iter().copied().collect()));
        self
    }

    /// Queue avrdude results; runs past the queue succeed.
    pub fn tool_results(self, results: &[bool]) -> Self {
        self.0.borrow_mut().results.extend(results.iter().copied());
        self
    }

    /// Every port listing fails from now on.
    pub fn failing_list(self) -> Self {
        self.0.borrow_mut().fail_list = true;
        self
    }

    /// Every open of a port (touch or flush) fails with "busy".
    pub fn failing_touch(self) -> Self {
        self.0.borrow_mut().fail_touch = true;
        self
    }

    pub fn tool_output(self, output: &str) -> Self {
        self.0.borrow_mut().output = output.to_owned();
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn now(&self) -> u64 {
        self.0.borrow().now_ms
    }

    pub fn runs(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Run { args, .. } => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn touches(&self) -> Vec<(String, u32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Touch { port, baud, .. } => Some((port, baud)),
                _ => None,
            })
            .collect()
    }

    pub fn uploader(&self, settings: Settings) -> Uploader<Bench, Bench, Bench> {
        Uploader::new(settings, self.clone(), self.clone(), self.clone())
            .with_platform(Platform::Linux)
            .with_tool(ToolPrefix::new("avrdude", Some("/hw/avrdude.conf".into())))
    }
}

impl PortEnumerator for Bench {
    fn list(&mut self) -> Result<PortSnapshot> {
        let mut s = self.0.borrow_mut();
        let at = s.now_ms;
        s.events.push(Event::List { at });
        if s.fail_list {
            return Err(UploadError::PortEnumeration(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "enumeration failed",
            )));
        }
        Ok(s.timeline
            .iter()
            .filter(|(from, _)| *from <= at)
            .last()
            .map(|(_, ports)| ports.clone())
            .unwrap_or_default())
    }
}

impl PortToucher for Bench {
    fn touch(&mut self, port: &str, baud: u32) -> Result<()> {
        let mut s = self.0.borrow_mut();
        let at = s.now_ms;
        s.events.push(Event::Touch { port: port.to_owned(), baud, at });
        if s.fail_touch {
            return Err(busy(port));
        }
        Ok(())
    }

    fn flush(&mut self, port: &str) -> Result<()> {
        let mut s = self.0.borrow_mut();
        let at = s.now_ms;
        s.events.push(Event::Flush { port: port.to_owned(), at });
        if s.fail_touch {
            return Err(busy(port));
        }
        Ok(())
    }
}

impl Clock for Bench {
    fn sleep(&mut self, d: Duration) {
        let mut s = self.0.borrow_mut();
        let ms = d.as_millis() as u64;
        s.now_ms += ms;
        s.events.push(Event::Sleep { ms });
    }
}

impl ProcessExecutor for Bench {
    fn run(&mut self, args: &[String]) -> Result<ExecOutcome> {
        let mut s = self.0.borrow_mut();
        let at = s.now_ms;
        s.events.push(Event::Run { args: args.to_vec(), at });
        let success = s.results.pop_front().unwrap_or(true);
        Ok(ExecOutcome { success, output: s.output.clone() })
    }
}

fn busy(port: &str) -> UploadError {
    UploadError::PortAccess {
        port:   port.to_owned(),
        source: serialport::Error::new(serialport::ErrorKind::NoDevice, "busy"),
    }
}

/// Settings parsed from `extra` on top of a fixed `/hw` hardware root.
pub fn settings(extra: &str) -> Settings {
    let text = format!("hardware = \"/hw\"\n{}", extra);
    Settings::parse(&text, Path::new("test.toml")).expect("test settings parse")
}

pub fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

pub fn is_config(err: &UploadError) -> bool {
    err.is_config()
}
