use std::path::Path;

use chrono::{NaiveTime, Timelike};

use crate::{
    alarm::{Alarm, AlarmKind},
    config::Sound,
    error::{Error, Result},
};

/// collects user input for a new alarm, [`AlarmBuilder::build`] checks it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmBuilder {
    kind: AlarmKind,
    hours: u32,
    minutes: u32,
    duration_seconds: u32,
    vibrate: bool,
    audio_uri: String,
    audio_text: String,
    enabled: bool,
}

impl AlarmBuilder {
    /// a silent, disabled alarm that rings for 10 seconds
    #[must_use]
    pub const fn new(kind: AlarmKind, hours: u32, minutes: u32) -> Self {
        Self {
            kind,
            hours,
            minutes,
            duration_seconds: 10,
            vibrate: false,
            audio_uri: String::new(),
            audio_text: String::new(),
            enabled: false,
        }
    }

    #[must_use]
    pub const fn fixed(hours: u32, minutes: u32) -> Self {
        Self::new(AlarmKind::Fixed, hours, minutes)
    }

    #[must_use]
    pub const fn elapsed(hours: u32, minutes: u32) -> Self {
        Self::new(AlarmKind::Elapsed, hours, minutes)
    }

    #[must_use]
    pub const fn recurring(hours: u32, minutes: u32) -> Self {
        Self::new(AlarmKind::Recurring, hours, minutes)
    }

    /// a fixed alarm from `HH:MM`
    pub fn at_time(time: &str) -> Result<Self> {
        let (hours, minutes) = parse_clock_time(time)?;
        Ok(Self::fixed(hours, minutes))
    }

    #[must_use]
    pub fn duration_seconds(mut self, duration_seconds: u32) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }

    #[must_use]
    pub fn vibrate(mut self, vibrate: bool) -> Self {
        self.vibrate = vibrate;
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn sound(mut self, sound: &Sound, sounds_dir: &Path) -> Self {
        self.audio_uri = sound.resolve(sounds_dir).to_string_lossy().into_owned();
        self.audio_text = sound.name().to_string();
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.audio_uri.clear();
        self.audio_text = "Silent".to_string();
        self
    }

    pub fn build(self) -> Result<Alarm> {
        if self.kind == AlarmKind::Fixed && (self.hours > 23 || self.minutes > 59) {
            return Err(Error::InvalidTime {
                hours: self.hours,
                minutes: self.minutes,
            });
        }
        Ok(Alarm {
            id: 0,
            kind: self.kind,
            hours: self.hours,
            minutes: self.minutes,
            duration_seconds: self.duration_seconds,
            vibrate: self.vibrate,
            audio_uri: self.audio_uri,
            audio_text: self.audio_text,
            enabled: self.enabled,
        })
    }
}

pub fn parse_clock_time(time: &str) -> Result<(u32, u32)> {
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| Error::BadTimeFormat(time.to_string()))?;
    Ok((time.hour(), time.minute()))
}
