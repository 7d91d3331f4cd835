//! Settings resolution with runtime overrides.
//!
//! Each of the four settings resolves, in order, from:
//!
//! 1. a runtime override named `com.perforce.p4settings.<key>`,
//! 2. `<key>` in the local `PerforceSettings.txt` properties file,
//! 3. a built-in default.
//!
//! Empty values at any tier count as absent. A missing file is silently
//! ignored; an unreadable one yields a [`LoadWarning`] next to the resolved
//! [`Settings`] so the caller decides how to report it.

use std::{
    collections::HashMap,
    env,
    ffi::OsString,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::properties::{self, Properties, PropertiesError};

/// Namespace prefix for runtime overrides.
pub const OVERRIDE_PREFIX: &str = "com.perforce.p4settings.";

/// Settings file, relative to the current working directory.
pub const CONFIG_FILE: &str = "PerforceSettings.txt";

/// Env var that points the loader at a different settings file.
pub const CONFIG_PATH_ENV: &str = "P4SETTINGS_CONFIG";

/// The four settings a demo program needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ServerUri,
    UserName,
    ClientName,
    Password,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::ServerUri,
        SettingKey::UserName,
        SettingKey::ClientName,
        SettingKey::Password,
    ];

    /// Property name, as used in the settings file and after [`OVERRIDE_PREFIX`].
    pub fn name(self) -> &'static str {
        match self {
            SettingKey::ServerUri => "serverUri",
            SettingKey::UserName => "userName",
            SettingKey::ClientName => "clientName",
            SettingKey::Password => "password",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            SettingKey::ServerUri => "p4java://your_ip_address:1666",
            SettingKey::UserName => "your_id",
            SettingKey::ClientName => "your_workspace_name",
            SettingKey::Password => "your_password",
        }
    }

    /// Fully-qualified override name, e.g. `com.perforce.p4settings.userName`.
    pub fn override_name(self) -> String {
        format!("{OVERRIDE_PREFIX}{}", self.name())
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Precedence tier a setting was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Override,
    File,
    Default,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Override => "override",
            Source::File => "file",
            Source::Default => "default",
        })
    }
}

/// A resolved setting value.
#[derive(Clone, PartialEq, Eq)]
pub struct Setting {
    value: String,
    source: Source,
}

impl Setting {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:?})", self.value, self.source)
    }
}

/// Fully-resolved settings. Immutable once built; pass it by reference.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_uri: Setting,
    pub user_name: Setting,
    pub client_name: Setting,
    pub password: Setting,
}

impl Settings {
    /// Resolve all four settings against the given override and file tiers.
    pub fn resolve(overrides: &Overrides, file: &Properties) -> Self {
        let get = |key: SettingKey| resolve(key.name(), key.default_value(), overrides, file);
        Self {
            server_uri: get(SettingKey::ServerUri),
            user_name: get(SettingKey::UserName),
            client_name: get(SettingKey::ClientName),
            password: get(SettingKey::Password),
        }
    }

    pub fn get(&self, key: SettingKey) -> &Setting {
        match key {
            SettingKey::ServerUri => &self.server_uri,
            SettingKey::UserName => &self.user_name,
            SettingKey::ClientName => &self.client_name,
            SettingKey::Password => &self.password,
        }
    }

    /// Serializable summary with the password masked.
    pub fn report(&self) -> SettingsReport<'_> {
        SettingsReport {
            server_uri: self.report_entry(SettingKey::ServerUri),
            user_name: self.report_entry(SettingKey::UserName),
            client_name: self.report_entry(SettingKey::ClientName),
            password: self.report_entry(SettingKey::Password),
        }
    }

    fn report_entry(&self, key: SettingKey) -> ReportEntry<'_> {
        let setting = self.get(key);
        let value = match key {
            SettingKey::Password => "********",
            _ => setting.as_str(),
        };
        ReportEntry {
            value,
            source: setting.source(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("server_uri", &self.server_uri)
            .field("user_name", &self.user_name)
            .field("client_name", &self.client_name)
            .field("password", &format_args!("<redacted> ({:?})", self.password.source))
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsReport<'a> {
    pub server_uri: ReportEntry<'a>,
    pub user_name: ReportEntry<'a>,
    pub client_name: ReportEntry<'a>,
    pub password: ReportEntry<'a>,
}

#[derive(Debug, Serialize)]
pub struct ReportEntry<'a> {
    pub value: &'a str,
    pub source: Source,
}

/// Runtime override source, keyed by fully-qualified property name.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    values: HashMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(env::vars_os())
    }

    /// Keep the entries whose names carry [`OVERRIDE_PREFIX`]; non-Unicode
    /// names or values are skipped.
    pub fn from_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let values = vars
            .into_iter()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .filter(|(name, _)| name.starts_with(OVERRIDE_PREFIX))
            .collect();
        Self { values }
    }

    /// Set an override by its fully-qualified name. Later calls win.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder form of [`set`](Self::set) taking a bare key such as `userName`.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(format!("{OVERRIDE_PREFIX}{key}"), value);
        self
    }

    /// Apply a `-D`-style definition: `name=value`, or a bare `name` for an
    /// empty value. The leading `-D` is optional.
    pub fn define(&mut self, definition: &str) -> Result<(), OverrideError> {
        let definition = definition.strip_prefix("-D").unwrap_or(definition);
        let (name, value) = definition.split_once('=').unwrap_or((definition, ""));
        if name.is_empty() {
            return Err(OverrideError::EmptyName(definition.to_string()));
        }
        self.set(name, value);
        Ok(())
    }

    /// Non-empty override for a bare key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&format!("{OVERRIDE_PREFIX}{key}"))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverrideError {
    #[error("override definition '{0}' has no name")]
    EmptyName(String),
}

/// Resolve one setting: override, then file, then `default_value`.
pub fn resolve(key: &str, default_value: &str, overrides: &Overrides, file: &Properties) -> Setting {
    let (value, source) = if let Some(v) = overrides.get(key) {
        (v, Source::Override)
    } else if let Some(v) = file.get_non_empty(key) {
        (v, Source::File)
    } else {
        (default_value, Source::Default)
    };
    Setting {
        value: value.to_string(),
        source,
    }
}

/// Non-fatal problem with the settings file. Resolution carried on without it.
#[derive(Debug, Error)]
pub enum LoadWarning {
    #[error("cannot read settings file {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("ignoring settings file {}: {source}", path.display())]
    Malformed { path: PathBuf, source: PropertiesError },
}

/// Outcome of a settings load.
#[derive(Debug)]
pub struct Loaded {
    pub settings: Settings,
    pub warning: Option<LoadWarning>,
}

/// Path of the settings file: `P4SETTINGS_CONFIG` if set, else [`CONFIG_FILE`].
pub fn default_config_path() -> PathBuf {
    config_path_from(env::var(CONFIG_PATH_ENV).ok())
}

/// Settings file path for a raw `P4SETTINGS_CONFIG` value. Unset or empty
/// falls back to [`CONFIG_FILE`]; a leading `~` is expanded.
pub fn config_path_from(raw: Option<String>) -> PathBuf {
    raw.filter(|p| !p.is_empty())
        .map(|p| expand_home(&p))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Load settings from the process environment and the default settings file.
pub fn load() -> Loaded {
    load_from(&default_config_path(), &Overrides::from_env())
}

/// Internal loader: explicit file path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Loaded {
    let (file, warning) = match read_file_config(path) {
        Ok(file) => (file, None),
        Err(w) => (Properties::new(), Some(w)),
    };
    debug!(path = %path.display(), entries = file.len(), "settings file read");

    Loaded {
        settings: Settings::resolve(overrides, &file),
        warning,
    }
}

fn read_file_config(path: &Path) -> Result<Properties, LoadWarning> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Properties::new()),
        Err(source) => {
            return Err(LoadWarning::Unreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    properties::parse(&properties::decode(bytes)).map_err(|source| LoadWarning::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// One-time initialisation guard for settings shared across threads.
///
/// ```no_run
/// use p4settings::config::{self, Settings, SettingsCell};
///
/// static SETTINGS: SettingsCell = SettingsCell::new();
///
/// fn settings() -> &'static Settings {
///     SETTINGS.get_or_load(config::load)
/// }
/// ```
#[derive(Debug, Default)]
pub struct SettingsCell {
    cell: OnceLock<Settings>,
}

impl SettingsCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Return the settings, running `loader` on first access only. A load
    /// warning is logged once.
    pub fn get_or_load(&self, loader: impl FnOnce() -> Loaded) -> &Settings {
        self.cell.get_or_init(|| {
            let Loaded { settings, warning } = loader();
            if let Some(w) = warning {
                warn!("{w}");
            }
            settings
        })
    }

    pub fn get(&self) -> Option<&Settings> {
        self.cell.get()
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
