// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: config  ·  read-only key/value configuration source
//
//  Three things live here:
//
//    Profile      a flat `key → value` map (board, programmer, preferences)
//    TargetTable  device families, each with a folder and a programmer table
//    Settings     everything an upload reads, loaded from avr-upload.toml
//
//  Settings file lookup, in order:
//
//  1. --config <file>            (explicit)
//  2. ./avr-upload.toml          (if present)
//  3. built-in defaults
//
//  The hardware root follows the SDK discovery order of the toolchain:
//  AVR_UPLOAD_HARDWARE env var, then `hardware = …` in the file, then the
//  usual Arduino IDE 1.x install locations.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::boards::{self, Board};
use crate::error::{Result, UploadError};

pub const DEFAULT_SETTINGS_FILE: &str = "avr-upload.toml";
pub const HARDWARE_ENV: &str = "AVR_UPLOAD_HARDWARE";
pub const DEFAULT_TARGET: &str = "arduino";

const DEFAULT_PREFERENCES: &[(&str, &str)] = &[
    ("serial.debug_rate", "9600"),
    ("upload.verify",     "true"),
    ("upload.verbose",    "false"),
    ("programmer",        "arduino:avrispmkii"),
];

const HARDWARE_CANDIDATES: &[&str] = &[
    "/usr/share/arduino/hardware",
    "/usr/local/share/arduino/hardware",
    "/opt/arduino/hardware",
];

// ─────────────────────────────────────────────────────────────────────────────
//  ConfigSource
// ─────────────────────────────────────────────────────────────────────────────

/// Key/value lookups over namespaced keys such as `upload.protocol`.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<&str>;

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| UploadError::missing(key))
    }

    /// Case-insensitive `"true"`; anything else (including absence) is false.
    fn get_bool(&self, key: &str) -> bool {
        self.get(key).map_or(false, |v| v.eq_ignore_ascii_case("true"))
    }

    fn get_integer(&self, key: &str) -> Result<u32> {
        let raw = self.require(key)?;
        raw.trim()
            .parse::<u32>()
            .map_err(|_| UploadError::invalid(key, format!("'{}' is not a number", raw)))
    }
}

/// Flat string map. Used for board profiles, programmer profiles and
/// user preferences alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile(BTreeMap<String, String>);

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Copy every entry of `other` over this profile.
    pub fn overlay(&mut self, other: &Profile) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Build a profile from a TOML table, flattening nested tables into
    /// dotted keys (`[upload] speed = 57600` → `upload.speed = "57600"`).
    pub fn from_toml(table: &toml::Table) -> Self {
        let mut out = Profile::new();
        flatten_into("", table, &mut out);
        out
    }
}

impl ConfigSource for Profile {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Profile {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Profile(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn flatten_into(prefix: &str, table: &toml::Table, out: &mut Profile) {
    for (k, v) in table {
        let key = if prefix.is_empty() { k.clone() } else { format!("{}.{}", prefix, k) };
        let value = match v {
            toml::Value::Table(t) => {
                flatten_into(&key, t, out);
                continue;
            }
            toml::Value::String(s)   => s.clone(),
            toml::Value::Integer(i)  => i.to_string(),
            toml::Value::Float(f)    => f.to_string(),
            toml::Value::Boolean(b)  => b.to_string(),
            toml::Value::Datetime(d) => d.to_string(),
            toml::Value::Array(_) => {
                log::warn!("ignoring array value for '{}': profiles hold scalars only", key);
                continue;
            }
        };
        out.insert(key, value);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Targets  (device families)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Target {
    pub name:        String,
    /// Root of the family's hardware folder (holds `bootloaders/`).
    pub folder:      PathBuf,
    pub programmers: BTreeMap<String, Profile>,
}

impl Target {
    pub fn programmer(&self, name: &str) -> Result<&Profile> {
        self.programmers.get(name).ok_or_else(|| {
            UploadError::invalid(
                "programmer",
                format!("unknown programmer '{}' for target '{}'", name, self.name),
            )
        })
    }

    pub fn bootloaders_dir(&self) -> PathBuf {
        self.folder.join("bootloaders")
    }
}

/// Family name → Target.
#[derive(Debug, Clone, Default)]
pub struct TargetTable(BTreeMap<String, Target>);

impl TargetTable {
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.0.get(name)
    }

    pub fn insert(&mut self, target: Target) {
        self.0.insert(target.name.clone(), target);
    }

    /// Resolve a possibly family-qualified name.
    ///
    /// `"family:name"` selects `family` and strips the prefix; a bare `"name"`
    /// stays in `current`. `key` is the configuration key the name came from,
    /// used for error reporting.
    pub fn resolve<'q>(&self, key: &str, qualified: &'q str, current: &str) -> Result<(&Target, &'q str)> {
        let (family, name) = match qualified.split_once(':') {
            Some((family, name)) => (family, name),
            None                 => (current, qualified),
        };
        let target = self.get(family).ok_or_else(|| {
            UploadError::invalid(key, format!("unknown target '{}'", family))
        })?;
        Ok((target, name))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Settings {
    /// Installation root holding `tools/` and the target folders.
    pub hardware:    PathBuf,
    /// Current device family.
    pub target:      String,
    /// Built-in board the board profile starts from.
    pub preset:      Option<String>,
    /// User preferences (`serial.port`, `upload.verify`, `programmer`, …).
    pub preferences: Profile,
    /// Board keys laid over the preset.
    pub board:       Profile,
    pub targets:     TargetTable,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    hardware:    Option<PathBuf>,
    target:      Option<String>,
    preset:      Option<String>,
    preferences: toml::Table,
    board:       toml::Table,
    targets:     BTreeMap<String, TargetFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TargetFile {
    folder:      Option<PathBuf>,
    programmers: BTreeMap<String, toml::Table>,
}

impl Settings {
    /// Built-in defaults: default preferences and the `arduino` target with
    /// its stock programmers.
    pub fn builtin() -> Self {
        Self::with_hardware(resolve_hardware(None))
    }

    fn with_hardware(hardware: PathBuf) -> Self {
        let mut targets = TargetTable::default();
        targets.insert(Target {
            name:        DEFAULT_TARGET.into(),
            folder:      hardware.join(DEFAULT_TARGET),
            programmers: boards::builtin_programmers(),
        });

        Settings {
            hardware,
            target:      DEFAULT_TARGET.into(),
            preset:      None,
            preferences: Profile::from_pairs(DEFAULT_PREFERENCES),
            board:       Profile::new(),
            targets,
        }
    }

    /// Load `avr-upload.toml` from the working directory if present,
    /// otherwise the built-in defaults.
    pub fn load_default() -> Result<Self> {
        let path = Path::new(DEFAULT_SETTINGS_FILE);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::builtin())
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    /// Parse settings text. `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let file: SettingsFile = toml::from_str(text).map_err(|source| UploadError::SettingsFile {
            path: origin.to_owned(),
            source,
        })?;

        let mut settings = Self::with_hardware(resolve_hardware(file.hardware));
        if let Some(target) = file.target {
            settings.target = target;
        }
        settings.preset = file.preset;
        settings.preferences.overlay(&Profile::from_toml(&file.preferences));
        settings.board = Profile::from_toml(&file.board);

        for (name, tf) in file.targets {
            let folder = tf.folder.unwrap_or_else(|| settings.hardware.join(&name));
            let mut programmers = settings
                .targets
                .get(&name)
                .map(|t| t.programmers.clone())
                .unwrap_or_default();
            for (id, table) in &tf.programmers {
                programmers
                    .entry(id.clone())
                    .or_insert_with(Profile::new)
                    .overlay(&Profile::from_toml(table));
            }
            settings.targets.insert(Target { name, folder, programmers });
        }

        Ok(settings)
    }

    /// The board profile for one upload: the preset (if any) overlaid with
    /// the explicit board keys.
    pub fn board_profile(&self) -> Result<Profile> {
        let mut profile = match &self.preset {
            Some(id) => Board::find(id)
                .ok_or_else(|| UploadError::invalid("preset", format!("unknown board '{}'", id)))?
                .profile(),
            None => Profile::new(),
        };
        profile.overlay(&self.board);
        Ok(profile)
    }
}

/// Installation root: env override, then the settings file, then the first
/// existing well-known install.
fn resolve_hardware(from_file: Option<PathBuf>) -> PathBuf {
    if let Ok(root) = std::env::var(HARDWARE_ENV) {
        if !root.is_empty() {
            return PathBuf::from(root);
        }
    }
    if let Some(path) = from_file {
        return path;
    }
    HARDWARE_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_dir())
        .unwrap_or_else(|| PathBuf::from(HARDWARE_CANDIDATES[0]))
}
