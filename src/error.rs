use std::path::PathBuf;

use thiserror::Error;

use crate::{alarm::AlarmKind, ringing::RingError, AlarmId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("couldn't parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("couldn't serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("couldn't locate the zzpal project directories")]
    NoProjectDirs,
    #[error("alarm scheduler unavailable: {0}")]
    HostUnavailable(String),
    #[error("{hours}:{minutes:02} is not a valid time of day")]
    InvalidTime { hours: u32, minutes: u32 },
    #[error("couldn't parse time `{0}`, expected HH:MM")]
    BadTimeFormat(String),
    #[error("alarm target time is out of range")]
    TimeOverflow,
    #[error("alarm has not been saved yet")]
    Unsaved,
    #[error("alarm #{id} cannot change from {from} to {to}")]
    KindChanged {
        id: AlarmId,
        from: AlarmKind,
        to: AlarmKind,
    },
    #[error("no alarm ids left")]
    IdsExhausted,
    #[error("no alarm with id #{0}")]
    NotFound(AlarmId),
    #[error("unknown sound `{0}`")]
    UnknownSound(String),
    #[error("wake lock {0} is already held")]
    WakeLockHeld(String),
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error("background worker stopped")]
    WorkerGone,
    #[error("couldn't initialize logger: {0}")]
    Logger(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
