//! Display-ready output entries and the filters applied to them.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Display category of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Log,
    Info,
    Warn,
    Error,
    Table,
    Group,
    Count,
    Time,
    Trace,
    Assert,
}

/// Color family an output panel uses for a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Plain,
    Warning,
    Danger,
    Success,
    Accent,
    Metric,
    Heading,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Log => "log",
            EntryKind::Info => "info",
            EntryKind::Warn => "warn",
            EntryKind::Error => "error",
            EntryKind::Table => "table",
            EntryKind::Group => "group",
            EntryKind::Count => "count",
            EntryKind::Time => "time",
            EntryKind::Trace => "trace",
            EntryKind::Assert => "assert",
        }
    }

    pub fn tone(self) -> Tone {
        match self {
            EntryKind::Warn => Tone::Warning,
            EntryKind::Error | EntryKind::Assert => Tone::Danger,
            EntryKind::Table => Tone::Success,
            EntryKind::Trace => Tone::Accent,
            EntryKind::Count | EntryKind::Time => Tone::Metric,
            EntryKind::Group => Tone::Heading,
            EntryKind::Log | EntryKind::Info => Tone::Plain,
        }
    }

    /// The filter governing this kind, if any. Other kinds are always shown.
    pub fn filter_key(self) -> Option<FilterKey> {
        match self {
            EntryKind::Log => Some(FilterKey::Log),
            EntryKind::Info => Some(FilterKey::Info),
            EntryKind::Warn => Some(FilterKey::Warn),
            EntryKind::Error => Some(FilterKey::Error),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line (or block) of rendered console output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutputEntry {
    /// Unique per entry; only meant as a list key.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub text: String,
    /// Number of enclosing open groups.
    pub depth: usize,
}

impl OutputEntry {
    pub fn new(kind: EntryKind, text: impl Into<String>, depth: usize) -> Self {
        Self {
            id: entry_id(),
            kind,
            text: text.into(),
            depth,
        }
    }
}

fn entry_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{millis}-{}", &suffix[..12])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Log,
    Info,
    Warn,
    Error,
}

impl FromStr for FilterKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(FilterKey::Log),
            "info" => Ok(FilterKey::Info),
            "warn" => Ok(FilterKey::Warn),
            "error" => Ok(FilterKey::Error),
            other => Err(format!(
                "unknown output filter '{other}' (expected log, info, warn or error)"
            )),
        }
    }
}

/// Which categories are visible. Filtering never discards entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OutputFilters {
    pub log: bool,
    pub info: bool,
    pub warn: bool,
    pub error: bool,
}

impl Default for OutputFilters {
    fn default() -> Self {
        Self {
            log: true,
            info: true,
            warn: true,
            error: true,
        }
    }
}

impl OutputFilters {
    fn slot(&mut self, key: FilterKey) -> &mut bool {
        match key {
            FilterKey::Log => &mut self.log,
            FilterKey::Info => &mut self.info,
            FilterKey::Warn => &mut self.warn,
            FilterKey::Error => &mut self.error,
        }
    }

    pub fn is_enabled(&self, key: FilterKey) -> bool {
        match key {
            FilterKey::Log => self.log,
            FilterKey::Info => self.info,
            FilterKey::Warn => self.warn,
            FilterKey::Error => self.error,
        }
    }

    pub fn set(&mut self, key: FilterKey, enabled: bool) {
        *self.slot(key) = enabled;
    }

    pub fn toggle(&mut self, key: FilterKey) {
        let slot = self.slot(key);
        *slot = !*slot;
    }

    pub fn allows(&self, entry: &OutputEntry) -> bool {
        entry
            .kind
            .filter_key()
            .map_or(true, |key| self.is_enabled(key))
    }
}
