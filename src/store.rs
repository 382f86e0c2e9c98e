use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    alarm::{Alarm, AlarmId},
    config::Collection,
    disk::{self, FileLock},
    error::{Error, Result},
};

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AlarmTable {
    /// never handed out twice, even after a delete
    next_id: AlarmId,
    #[serde(default)]
    alarms: Collection<AlarmId, Alarm>,
}

impl Default for AlarmTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            alarms: Collection::new(),
        }
    }
}

/// Alarms kept in a single TOML table keyed by id.
/// Every change rewrites the file.
#[derive(Debug)]
pub struct AlarmStore {
    path: PathBuf,
    table: AlarmTable,
}

impl AlarmStore {
    /// an empty store if `path` doesn't exist yet
    pub fn open(path: PathBuf) -> Result<Self> {
        let table = load(&path)?;
        Ok(Self { path, table })
    }

    pub fn in_dir(dir: &Path) -> Result<Self> {
        Self::open(dir.join("alarms.toml"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ordered by hours, then minutes
    #[must_use]
    pub fn list_all(&self) -> Vec<Alarm> {
        let mut alarms: Vec<Alarm> = self.table.alarms.values().cloned().collect();
        alarms.sort_by_key(|a| (a.hours, a.minutes, a.id));
        alarms
    }

    #[must_use]
    pub fn get(&self, id: AlarmId) -> Option<Alarm> {
        self.table.alarms.get(&id).cloned()
    }

    /// Gives `alarm` an id if it has none. An alarm with the same id is replaced.
    pub fn insert(&mut self, mut alarm: Alarm) -> Result<AlarmId> {
        let id = self.modify(move |table| {
            if alarm.id == 0 {
                alarm.id = table.next_id;
            }
            let after = alarm.id.checked_add(1).ok_or(Error::IdsExhausted)?;
            table.next_id = table.next_id.max(after);
            let id = alarm.id;
            table.alarms.insert(alarm);
            Ok((id, true))
        })?;
        debug!("inserted alarm #{id}");
        Ok(id)
    }

    /// Overwrites the stored alarm with the same id, false if there is none.
    pub fn update(&mut self, alarm: Alarm) -> Result<bool> {
        self.modify(move |table| {
            match table.alarms.get(&alarm.id) {
                None => return Ok((false, false)),
                Some(existing) if existing.kind() != alarm.kind() => {
                    return Err(Error::KindChanged {
                        id: alarm.id,
                        from: existing.kind(),
                        to: alarm.kind(),
                    });
                }
                Some(_) => {}
            }
            table.alarms.insert(alarm);
            Ok((true, true))
        })
    }

    pub fn delete(&mut self, id: AlarmId) -> Result<Option<Alarm>> {
        let removed = self.modify(|table| {
            let removed = table.alarms.remove(&id);
            let changed = removed.is_some();
            Ok((removed, changed))
        })?;
        if removed.is_some() {
            debug!("deleted alarm #{id}");
        }
        Ok(removed)
    }

    /// Applies `change` to the table on disk under the file lock. The store
    /// only takes the new table once it is saved; `change` says whether
    /// there is anything to save.
    fn modify<T>(
        &mut self,
        change: impl FnOnce(&mut AlarmTable) -> Result<(T, bool)>,
    ) -> Result<T> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _lock = FileLock::acquire(&self.path)?;
        let mut table = load(&self.path)?;
        let (out, changed) = change(&mut table)?;
        if changed {
            disk::write_atomic(&self.path, &toml::to_string(&table)?)?;
        }
        self.table = table;
        Ok(out)
    }
}

fn load(path: &Path) -> Result<AlarmTable> {
    match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(AlarmTable::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alarm::AlarmKind, alarm_edit::AlarmBuilder};

    fn fixed(hours: u32, minutes: u32) -> Alarm {
        AlarmBuilder::fixed(hours, minutes).build().unwrap()
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        assert_eq!(store.insert(fixed(8, 0)).unwrap(), 1);
        assert_eq!(store.insert(fixed(9, 0)).unwrap(), 2);
        store.delete(2).unwrap();
        assert_eq!(store.insert(fixed(10, 0)).unwrap(), 3);
    }

    #[test]
    fn insert_replaces_on_id_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        let id = store.insert(fixed(8, 0)).unwrap();
        let mut replacement = fixed(6, 15);
        replacement.id = id;
        assert_eq!(store.insert(replacement).unwrap(), id);

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!((all[0].hours, all[0].minutes), (6, 15));
    }

    #[test]
    fn list_is_ordered_by_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        for (h, m) in [(9, 30), (7, 45), (9, 5), (0, 0)] {
            store.insert(fixed(h, m)).unwrap();
        }
        let times: Vec<(u32, u32)> = store
            .list_all()
            .iter()
            .map(|a| (a.hours, a.minutes))
            .collect();
        assert_eq!(times, vec![(0, 0), (7, 45), (9, 5), (9, 30)]);
    }

    #[test]
    fn update_overwrites_existing_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        let id = store.insert(fixed(8, 0)).unwrap();

        let mut alarm = store.get(id).unwrap();
        alarm.enabled = true;
        alarm.duration_seconds = 30;
        assert!(store.update(alarm.clone()).unwrap());
        assert_eq!(store.get(id), Some(alarm));

        let mut stranger = fixed(1, 1);
        stranger.id = 77;
        assert!(!store.update(stranger).unwrap());
        assert_eq!(store.get(77), None);
    }

    #[test]
    fn update_cannot_change_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        let id = store.insert(fixed(8, 0)).unwrap();
        let mut elapsed = AlarmBuilder::elapsed(8, 0).build().unwrap();
        elapsed.id = id;
        assert!(matches!(
            store.update(elapsed),
            Err(Error::KindChanged {
                from: AlarmKind::Fixed,
                to: AlarmKind::Elapsed,
                ..
            })
        ));
    }

    #[test]
    fn delete_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        assert_eq!(store.delete(5).unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn reopening_sees_the_same_alarms_and_counter() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        store.insert(fixed(8, 0)).unwrap();
        store.insert(AlarmBuilder::elapsed(0, 30).vibrate(true).build().unwrap()).unwrap();
        store.delete(2).unwrap();

        let mut reopened = AlarmStore::in_dir(dir.path()).unwrap();
        assert_eq!(reopened.list_all(), store.list_all());
        assert_eq!(reopened.insert(fixed(5, 0)).unwrap(), 3);
    }

    #[test]
    fn failed_write_leaves_the_store_as_it_was() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        let id = store.insert(fixed(8, 0)).unwrap();

        std::fs::remove_file(store.path()).unwrap();
        std::fs::create_dir(store.path()).unwrap();
        assert!(matches!(store.insert(fixed(9, 0)), Err(Error::Io(_))));

        let mut alarm = store.get(id).unwrap();
        alarm.enabled = true;
        assert!(store.update(alarm).is_err());
        assert!(store.delete(id).is_err());

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert!(!all[0].enabled);
    }

    #[test]
    fn largest_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AlarmStore::in_dir(dir.path()).unwrap();
        let mut alarm = fixed(8, 0);
        alarm.id = AlarmId::MAX;
        assert!(matches!(store.insert(alarm), Err(Error::IdsExhausted)));
        assert!(store.list_all().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn two_stores_on_one_file_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = AlarmStore::in_dir(dir.path()).unwrap();
        let mut second = AlarmStore::in_dir(dir.path()).unwrap();

        assert_eq!(first.insert(fixed(8, 0)).unwrap(), 1);
        // second was opened before that insert and must not reuse its id
        assert_eq!(second.insert(fixed(9, 0)).unwrap(), 2);
        assert_eq!(second.list_all().len(), 2);

        assert_eq!(first.delete(2).unwrap().map(|a| a.hours), Some(9));
        assert_eq!(AlarmStore::in_dir(dir.path()).unwrap().list_all().len(), 1);
    }
}
