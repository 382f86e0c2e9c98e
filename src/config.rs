use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const APP_NAME: &str = "zzpal";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// used when listing fixed alarms
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_duration_seconds")]
    pub default_duration_seconds: u32,
    /// upper bound on how long a firing alarm keeps its wake lock
    #[serde(default = "default_wake_lock_timeout_seconds")]
    pub wake_lock_timeout_seconds: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// percent
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// where alarms and pending wake-ups are kept, the project data dir if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(flatten)]
    pub sounds: Sounds,
}

fn default_time_format() -> String {
    "%H:%M".to_string()
}

const fn default_duration_seconds() -> u32 {
    10
}

const fn default_wake_lock_timeout_seconds() -> u64 {
    60
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_volume() -> f32 {
    100.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
            default_duration_seconds: default_duration_seconds(),
            wake_lock_timeout_seconds: default_wake_lock_timeout_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            volume: default_volume(),
            data_dir: None,
            sounds: Sounds::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let config = std::fs::read_to_string(path)?;
        toml::from_str(&config).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// like [`Config::load`] but a missing file gives the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let config = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, config)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let mut path = project_dirs()?.config_dir().to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    pub fn sounds_path() -> Result<PathBuf> {
        let mut path = project_dirs()?.data_dir().to_path_buf();
        path.push("sounds");
        Ok(path)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }

    #[must_use]
    pub const fn wake_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.wake_lock_timeout_seconds)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME).ok_or(Error::NoProjectDirs)
}

pub trait GetId<T> {
    fn get_id(&self) -> &T;
}

/// Serializable collection, kept on disk as a list and in memory by id
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "Vec<V>", into = "Vec<V>")]
pub struct Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    data: BTreeMap<K, V>,
}

impl<K, V> Default for Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }
}

impl<K, V> Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// replaces (and returns) any item with the same id
    pub fn insert(&mut self, item: V) -> Option<V> {
        let id = item.get_id().to_owned();
        self.data.insert(id, item)
    }

    pub fn remove(&mut self, id: &K) -> Option<V> {
        self.data.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &K) -> Option<&V> {
        self.data.get(id)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.data.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.data.keys()
    }

    /// removes and returns every item matching `pred`
    pub fn drain_matching(&mut self, mut pred: impl FnMut(&V) -> bool) -> Vec<V> {
        let ids: Vec<K> = self
            .data
            .iter()
            .filter(|(_, v)| pred(v))
            .map(|(k, _)| k.clone())
            .collect();
        ids.iter().filter_map(|id| self.data.remove(id)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<K, V> From<Vec<V>> for Collection<K, V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    fn from(value: Vec<V>) -> Self {
        let mut obj: Self = Self::new();
        value.into_iter().for_each(|v| {
            obj.insert(v);
        });
        obj
    }
}

impl<K, V> From<Collection<K, V>> for Vec<V>
where
    K: Ord + Clone,
    V: GetId<K> + Clone,
{
    fn from(val: Collection<K, V>) -> Self {
        val.data.into_values().collect()
    }
}

/// missing keys fall back to the built-in catalogue
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Sounds {
    pub default_sound: String,
    pub sounds: HashMap<String, Sound>,
}

impl Default for Sounds {
    fn default() -> Self {
        Self {
            default_sound: Sound::get_default_name(),
            sounds: [Sound::ring(), Sound::beep_beep()]
                .into_iter()
                .map(|sound| (sound.name.clone(), sound))
                .collect(),
        }
    }
}

impl Sounds {
    pub fn get(&self, name: &str) -> Result<&Sound> {
        self.sounds
            .get(name)
            .ok_or_else(|| Error::UnknownSound(name.to_string()))
    }

    /// the sound to use when none is picked
    pub fn default_sound(&self) -> Result<&Sound> {
        self.get(&self.default_sound)
    }

    pub fn add(&mut self, sound: Sound) -> Option<Sound> {
        self.sounds.insert(sound.name.clone(), sound)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Sound {
    pub name: String,
    /// relative paths live in the sounds directory
    pub path: PathBuf,
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.name,
            self.path
                .file_name()
                .map_or_else(|| self.path.to_string_lossy(), |name| name.to_string_lossy())
        )
    }
}

impl Default for Sound {
    fn default() -> Self {
        Self::beep_beep()
    }
}

impl Sound {
    #[must_use]
    pub fn get_default_name() -> String {
        Self::default().name
    }

    #[must_use]
    pub const fn new(name: String, path: PathBuf) -> Self {
        Self { name, path }
    }

    #[must_use]
    pub fn ring() -> Self {
        Self {
            name: "ring".to_string(),
            path: PathBuf::from("ring.mp3"),
        }
    }

    #[must_use]
    pub fn beep_beep() -> Self {
        Self {
            name: "beep beep".to_string(),
            path: PathBuf::from("beep_beep.mp3"),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    #[must_use]
    pub fn resolve(&self, sounds_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            sounds_dir.join(&self.path)
        }
    }
}
