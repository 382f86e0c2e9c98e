use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::config::GetId;

/// 0 until the alarm store assigns one
pub type AlarmId = u64;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlarmKind {
    /// rings at a wall clock time, today or tomorrow
    Fixed,
    /// rings after `hours` and `minutes` have elapsed
    Elapsed,
    // behaves like `Elapsed`, there is no repeat yet
    Recurring,
}

impl AlarmKind {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Elapsed => "Interval",
            Self::Recurring => "Recurring",
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// represents an alarm.
/// `hours` and `minutes` are a time of day for [`AlarmKind::Fixed`] alarms and
/// an offset from the moment of scheduling for the other kinds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Alarm {
    #[serde(default)]
    pub id: AlarmId,
    pub(crate) kind: AlarmKind,
    pub hours: u32,
    pub minutes: u32,
    /// how long the alarm rings for
    pub duration_seconds: u32,
    pub vibrate: bool,
    /// empty for a silent alarm
    #[serde(default)]
    pub audio_uri: String,
    #[serde(default)]
    pub audio_text: String,
    #[serde(default)]
    pub enabled: bool,
}

impl GetId<AlarmId> for Alarm {
    fn get_id(&self) -> &AlarmId {
        &self.id
    }
}

impl Alarm {
    #[must_use]
    pub const fn kind(&self) -> AlarmKind {
        self.kind
    }

    /// true if everything but the id matches
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.hours == other.hours
            && self.minutes == other.minutes
            && self.duration_seconds == other.duration_seconds
            && self.vibrate == other.vibrate
            && self.audio_uri == other.audio_uri
            && self.audio_text == other.audio_text
            && self.enabled == other.enabled
    }

    /// multi line description used when dumping alarms to the log
    #[must_use]
    pub fn details(&self) -> String {
        format!(
            "#{} : type={}\n\tTime: {}h:{}m\n\tDuration: {}s\n\tVibration: {}\n\tSound: {}\n\tEnabled: {}",
            self.id,
            self.kind,
            self.hours,
            self.minutes,
            self.duration_seconds,
            if self.vibrate { "yes" } else { "no" },
            if self.audio_text.is_empty() {
                "Silent"
            } else {
                &self.audio_text
            },
            if self.enabled { "ON" } else { "OFF" },
        )
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}h:{}m, {}s.",
            self.kind, self.hours, self.minutes, self.duration_seconds
        )
    }
}

/// what changed between two alarm lists, by id
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListDiff {
    pub inserted: Vec<AlarmId>,
    pub removed: Vec<AlarmId>,
    pub changed: Vec<AlarmId>,
}

impl ListDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[must_use]
pub fn diff(previous: &[Alarm], current: &[Alarm]) -> ListDiff {
    let before: HashMap<AlarmId, &Alarm> = previous.iter().map(|a| (a.id, a)).collect();
    let mut result = ListDiff::default();
    for alarm in current {
        match before.get(&alarm.id) {
            None => result.inserted.push(alarm.id),
            Some(old) if !old.same_as(alarm) => result.changed.push(alarm.id),
            Some(_) => {}
        }
    }
    let after: HashMap<AlarmId, &Alarm> = current.iter().map(|a| (a.id, a)).collect();
    result.removed = previous
        .iter()
        .filter(|a| !after.contains_key(&a.id))
        .map(|a| a.id)
        .collect();
    result
}
