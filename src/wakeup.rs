use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    alarm::{Alarm, AlarmId},
    config::{Collection, GetId},
    disk::{self, FileLock},
    error::{Error, Result},
    schedule::AlarmHost,
};

/// everything needed to ring an alarm without looking it up again
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FirePayload {
    pub alarm_id: AlarmId,
    pub duration_seconds: u32,
    pub vibrate: bool,
    #[serde(default)]
    pub audio_uri: String,
}

impl FirePayload {
    #[must_use]
    pub fn from_alarm(alarm: &Alarm) -> Self {
        Self {
            alarm_id: alarm.id,
            duration_seconds: alarm.duration_seconds,
            vibrate: alarm.vibrate,
            audio_uri: alarm.audio_uri.clone(),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_seconds))
    }
}

/// a pending registration, one per alarm id
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Wakeup {
    /// local wall clock time
    #[serde(with = "toml_datetime_compat")]
    pub fire_at: NaiveDateTime,
    pub payload: FirePayload,
}

impl GetId<AlarmId> for Wakeup {
    fn get_id(&self) -> &AlarmId {
        &self.payload.alarm_id
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WakeupFile {
    #[serde(default)]
    wakeups: Collection<AlarmId, Wakeup>,
}

/// Pending wake-ups kept on disk so they outlive the process that
/// registered them. The daemon drains due entries with [`WakeupTable::take_due`].
#[derive(Debug, Clone)]
pub struct WakeupTable {
    path: PathBuf,
}

impl WakeupTable {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("wakeups.toml"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<WakeupFile> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(WakeupFile::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&raw).map_err(|source| Error::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// held around every read-modify-write, the daemon and the CLI share the file
    fn lock(&self) -> Result<FileLock> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::HostUnavailable(format!("{}: {e}", parent.display())))?;
        }
        Ok(FileLock::acquire(&self.path)?)
    }

    fn write(&self, file: &WakeupFile) -> Result<()> {
        disk::write_atomic(&self.path, &toml::to_string(file)?)?;
        Ok(())
    }

    /// removes and returns every wake-up due at `now`, earliest first
    pub fn take_due(&self, now: NaiveDateTime) -> Result<Vec<Wakeup>> {
        let _lock = self.lock()?;
        let mut file = self.read()?;
        let mut due = file.wakeups.drain_matching(|w| w.fire_at <= now);
        if due.is_empty() {
            return Ok(due);
        }
        self.write(&file)?;
        due.sort_by_key(|w| w.fire_at);
        Ok(due)
    }
}

impl AlarmHost for WakeupTable {
    fn register(&self, wakeup: Wakeup) -> Result<()> {
        let _lock = self.lock()?;
        let mut file = self.read()?;
        file.wakeups.insert(wakeup);
        self.write(&file)
    }

    fn cancel(&self, id: AlarmId) -> Result<()> {
        let _lock = self.lock()?;
        let mut file = self.read()?;
        if file.wakeups.remove(&id).is_some() {
            self.write(&file)?;
        }
        Ok(())
    }

    fn pending(&self) -> Result<Vec<Wakeup>> {
        let mut pending: Vec<Wakeup> = self.read()?.wakeups.values().cloned().collect();
        pending.sort_by_key(|w| w.fire_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::NaiveDate;

    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    fn wakeup(id: AlarmId, fire_at: NaiveDateTime) -> Wakeup {
        Wakeup {
            fire_at,
            payload: FirePayload {
                alarm_id: id,
                duration_seconds: 5,
                vibrate: true,
                audio_uri: "/sounds/ring.mp3".to_string(),
            },
        }
    }

    #[test]
    fn register_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let table = WakeupTable::in_dir(dir.path());
        table.register(wakeup(1, at(8, 0))).unwrap();
        table.register(wakeup(1, at(9, 15))).unwrap();

        let pending = table.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fire_at, at(9, 15));
    }

    #[test]
    fn cancel_without_registration_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let table = WakeupTable::in_dir(dir.path());
        table.cancel(42).unwrap();
        assert!(!table.path().exists());

        table.register(wakeup(1, at(8, 0))).unwrap();
        table.cancel(42).unwrap();
        table.cancel(1).unwrap();
        assert!(table.pending().unwrap().is_empty());
    }

    #[test]
    fn registrations_survive_a_new_table() {
        let dir = tempfile::tempdir().unwrap();
        WakeupTable::in_dir(dir.path())
            .register(wakeup(3, at(7, 30)))
            .unwrap();

        let reopened = WakeupTable::in_dir(dir.path());
        assert_eq!(reopened.pending().unwrap(), vec![wakeup(3, at(7, 30))]);
    }

    #[test]
    fn take_due_fires_each_wakeup_once() {
        let dir = tempfile::tempdir().unwrap();
        let table = WakeupTable::in_dir(dir.path());
        table.register(wakeup(1, at(8, 5))).unwrap();
        table.register(wakeup(2, at(8, 0))).unwrap();
        table.register(wakeup(3, at(12, 0))).unwrap();

        let due = table.take_due(at(8, 5)).unwrap();
        let ids: Vec<AlarmId> = due.iter().map(|w| w.payload.alarm_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(table.take_due(at(8, 5)).unwrap().is_empty());

        let left = table.pending().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload.alarm_id, 3);
    }

    #[test]
    fn corrupt_table_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let table = WakeupTable::in_dir(dir.path());
        std::fs::write(table.path(), "wakeups = 7").unwrap();
        assert!(matches!(table.pending(), Err(Error::Parse { .. })));
    }

    #[test]
    fn daemon_and_cli_tables_keep_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = WakeupTable::in_dir(dir.path());
        let cli = WakeupTable::in_dir(dir.path());

        let firing = thread::spawn(move || {
            for _ in 0..100 {
                daemon.register(wakeup(1, at(8, 0))).unwrap();
                assert_eq!(daemon.take_due(at(8, 0)).unwrap().len(), 1);
            }
        });
        for id in 100..200 {
            cli.register(wakeup(id, at(9, 0))).unwrap();
        }
        firing.join().unwrap();

        let ids: Vec<AlarmId> = cli
            .pending()
            .unwrap()
            .iter()
            .map(|w| w.payload.alarm_id)
            .collect();
        assert_eq!(ids, (100..200).collect::<Vec<_>>());
    }
}
