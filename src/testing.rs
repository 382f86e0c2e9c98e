use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    alarm::AlarmId,
    ringing::{RingError, Ringer},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingEvent {
    Play(AlarmId, PathBuf),
    Vibrate(AlarmId, Duration),
    Stop(AlarmId),
}

/// reports what the ringing worker asked for
#[derive(Debug)]
pub struct RecordingRinger {
    events: Sender<RingEvent>,
    fail_play: bool,
}

impl RecordingRinger {
    pub fn new() -> (Self, Receiver<RingEvent>) {
        let (events, received) = crossbeam_channel::unbounded();
        (
            Self {
                events,
                fail_play: false,
            },
            received,
        )
    }

    /// every `play` fails like a missing sound file would
    pub fn failing() -> (Self, Receiver<RingEvent>) {
        let (mut ringer, received) = Self::new();
        ringer.fail_play = true;
        (ringer, received)
    }
}

impl Ringer for RecordingRinger {
    fn play(&mut self, id: AlarmId, audio: &Path) -> Result<(), RingError> {
        if self.fail_play {
            return Err(RingError::Unreadable {
                path: audio.to_path_buf(),
                source: std::io::ErrorKind::NotFound.into(),
            });
        }
        let _ = self.events.send(RingEvent::Play(id, audio.to_path_buf()));
        Ok(())
    }

    fn vibrate(&mut self, id: AlarmId, duration: Duration) -> Result<(), RingError> {
        let _ = self.events.send(RingEvent::Vibrate(id, duration));
        Ok(())
    }

    fn stop(&mut self, id: AlarmId) {
        let _ = self.events.send(RingEvent::Stop(id));
    }
}

pub const WAIT: Duration = Duration::from_secs(5);
