use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use thiserror::Error;

use crate::{
    alarm::AlarmId,
    communication::{Message, MessageType},
    error::{Error, Result},
    wakeup::FirePayload,
};

// how long the worker sleeps when nothing is ringing
const IDLE_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum RingError {
    #[error("no audio output device")]
    NoOutputDevice,
    #[error("no vibrator on this device")]
    NoVibrator,
    #[error("couldn't open sound {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't decode sound: {0}")]
    Decode(#[from] rodio::decoder::DecoderError),
}

/// Sound and vibration for ringing alarms, driven by the ringing worker.
pub trait Ringer {
    fn play(&mut self, id: AlarmId, audio: &Path) -> Result<(), RingError>;
    fn vibrate(&mut self, id: AlarmId, duration: Duration) -> Result<(), RingError>;
    /// stops sound and vibration for `id`, fine if neither is running
    fn stop(&mut self, id: AlarmId);
}

/// plays alarm sounds on the default output device
pub struct Speaker {
    output: Option<OutputStream>,
    sinks: HashMap<AlarmId, Sink>,
    volume: f32,
}

impl Speaker {
    /// `volume` is in percent. Without an output device the speaker stays
    /// usable but every `play` fails.
    #[must_use]
    pub fn open(volume: f32) -> Self {
        let output = match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => Some(stream),
            Err(e) => {
                error!("couldn't open audio output: {e}");
                None
            }
        };
        Self {
            output,
            sinks: HashMap::new(),
            volume: volume / 100.0,
        }
    }
}

impl Ringer for Speaker {
    fn play(&mut self, id: AlarmId, audio: &Path) -> Result<(), RingError> {
        let output = self.output.as_ref().ok_or(RingError::NoOutputDevice)?;
        let file = File::open(audio).map_err(|source| RingError::Unreadable {
            path: audio.to_path_buf(),
            source,
        })?;
        // repeat until the alarm is stopped
        let input = Decoder::new(BufReader::new(file))?.repeat_infinite();
        let sink = Sink::connect_new(output.mixer());
        sink.set_volume(self.volume);
        sink.append(input);
        sink.play();
        if let Some(previous) = self.sinks.insert(id, sink) {
            previous.stop();
        }
        Ok(())
    }

    fn vibrate(&mut self, _id: AlarmId, _duration: Duration) -> Result<(), RingError> {
        Err(RingError::NoVibrator)
    }

    fn stop(&mut self, id: AlarmId) {
        if let Some(sink) = self.sinks.remove(&id) {
            sink.stop();
        }
    }
}

/// the file behind an alarm's audio uri, `None` for a silent alarm
#[must_use]
pub fn audio_path(uri: &str) -> Option<PathBuf> {
    let uri = uri.trim();
    if uri.is_empty() {
        return None;
    }
    Some(PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri)))
}

/// The ringing phase: a worker thread that owns the [`Ringer`] and stops
/// each alarm once its duration is up.
#[derive(Debug)]
pub struct RingingService {
    sender: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl RingingService {
    /// `make_ringer` runs on the worker thread, audio output handles don't
    /// need to be `Send`
    pub fn spawn<R, F>(make_ringer: F) -> Result<Self>
    where
        R: Ringer,
        F: FnOnce() -> R + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("ringing".to_string())
            .spawn(move || run(make_ringer(), &receiver))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn start(&self, payload: &FirePayload) -> Result<()> {
        self.send(Message::triggered(payload))
    }

    /// stops `id` before its duration is up
    pub fn stop(&self, id: AlarmId) -> Result<()> {
        self.send(Message::new(MessageType::AlarmStopped, id))
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(Error::WorkerGone)?
            .send(message)
            .map_err(|_| Error::WorkerGone)
    }

    /// stops everything still ringing and waits for the worker
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("ringing worker panicked");
            }
        }
    }
}

impl Drop for RingingService {
    fn drop(&mut self) {
        self.close();
    }
}

fn run<R: Ringer>(mut ringer: R, messages: &Receiver<Message>) {
    let mut deadlines: HashMap<AlarmId, Instant> = HashMap::new();
    loop {
        let now = Instant::now();
        deadlines.retain(|&id, deadline| {
            if *deadline > now {
                return true;
            }
            ringer.stop(id);
            info!("alarm {id} done ringing");
            false
        });
        let wait = deadlines
            .values()
            .min()
            .map_or(IDLE_WAIT, |deadline| deadline.saturating_duration_since(now));

        match messages.recv_timeout(wait) {
            Ok(Message {
                kind:
                    MessageType::AlarmTriggered {
                        duration_seconds,
                        vibrate,
                        audio_uri,
                    },
                alarm_id,
            }) => {
                if deadlines.remove(&alarm_id).is_some() {
                    ringer.stop(alarm_id);
                }
                info!("Alarm Ringing, Alarm ID: {alarm_id}");
                let duration = Duration::from_secs(u64::from(duration_seconds));
                match audio_path(&audio_uri) {
                    Some(path) => {
                        if let Err(e) = ringer.play(alarm_id, &path) {
                            error!("Error playing alarm sound: {e}");
                        }
                    }
                    None => info!("alarm {alarm_id} is silent"),
                }
                if vibrate {
                    if let Err(e) = ringer.vibrate(alarm_id, duration) {
                        warn!("alarm {alarm_id} can't vibrate: {e}");
                    }
                }
                deadlines.insert(alarm_id, Instant::now() + duration);
            }
            Ok(Message {
                kind: MessageType::AlarmStopped,
                alarm_id,
            }) => {
                if deadlines.remove(&alarm_id).is_some() {
                    ringer.stop(alarm_id);
                    info!("alarm {alarm_id} stopped");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                for (id, _) in deadlines.drain() {
                    ringer.stop(id);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRinger, RingEvent, WAIT};

    fn payload(id: AlarmId, duration_seconds: u32, vibrate: bool, audio_uri: &str) -> FirePayload {
        FirePayload {
            alarm_id: id,
            duration_seconds,
            vibrate,
            audio_uri: audio_uri.to_string(),
        }
    }

    #[test]
    fn audio_uris() {
        assert_eq!(audio_path(""), None);
        assert_eq!(audio_path("  "), None);
        assert_eq!(
            audio_path("file:///sounds/ring.mp3"),
            Some(PathBuf::from("/sounds/ring.mp3"))
        );
        assert_eq!(
            audio_path("/sounds/ring.mp3"),
            Some(PathBuf::from("/sounds/ring.mp3"))
        );
    }

    #[test]
    fn rings_for_the_configured_duration_then_stops() {
        let (ringer, events) = RecordingRinger::new();
        let service = RingingService::spawn(move || ringer).unwrap();
        let started = Instant::now();
        service
            .start(&payload(1, 1, true, "file:///sounds/ring.mp3"))
            .unwrap();

        assert_eq!(
            events.recv_timeout(WAIT).unwrap(),
            RingEvent::Play(1, PathBuf::from("/sounds/ring.mp3"))
        );
        assert_eq!(
            events.recv_timeout(WAIT).unwrap(),
            RingEvent::Vibrate(1, Duration::from_secs(1))
        );
        assert_eq!(events.recv_timeout(WAIT).unwrap(), RingEvent::Stop(1));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn silent_alarm_only_stops() {
        let (ringer, events) = RecordingRinger::new();
        let service = RingingService::spawn(move || ringer).unwrap();
        service.start(&payload(2, 0, false, "")).unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), RingEvent::Stop(2));
    }

    #[test]
    fn playback_failure_keeps_ringing_without_sound() {
        let (ringer, events) = RecordingRinger::failing();
        let service = RingingService::spawn(move || ringer).unwrap();
        service.start(&payload(3, 0, true, "/missing.mp3")).unwrap();
        assert_eq!(
            events.recv_timeout(WAIT).unwrap(),
            RingEvent::Vibrate(3, Duration::ZERO)
        );
        assert_eq!(events.recv_timeout(WAIT).unwrap(), RingEvent::Stop(3));
    }

    #[test]
    fn stop_ends_ringing_early() {
        let (ringer, events) = RecordingRinger::new();
        let service = RingingService::spawn(move || ringer).unwrap();
        service.start(&payload(4, 600, false, "/ring.mp3")).unwrap();
        assert!(matches!(
            events.recv_timeout(WAIT).unwrap(),
            RingEvent::Play(4, _)
        ));
        service.stop(4).unwrap();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), RingEvent::Stop(4));
        // stopping again is a no-op
        service.stop(4).unwrap();
        assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn shutdown_stops_whatever_is_ringing() {
        let (ringer, events) = RecordingRinger::new();
        let service = RingingService::spawn(move || ringer).unwrap();
        service.start(&payload(5, 600, false, "/ring.mp3")).unwrap();
        assert!(matches!(
            events.recv_timeout(WAIT).unwrap(),
            RingEvent::Play(5, _)
        ));
        service.shutdown();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), RingEvent::Stop(5));
    }

    #[test]
    fn retrigger_restarts_the_alarm() {
        let (ringer, events) = RecordingRinger::new();
        let service = RingingService::spawn(move || ringer).unwrap();
        service.start(&payload(6, 600, false, "/a.mp3")).unwrap();
        service.start(&payload(6, 600, false, "/b.mp3")).unwrap();
        assert_eq!(
            events.recv_timeout(WAIT).unwrap(),
            RingEvent::Play(6, PathBuf::from("/a.mp3"))
        );
        assert_eq!(events.recv_timeout(WAIT).unwrap(), RingEvent::Stop(6));
        assert_eq!(
            events.recv_timeout(WAIT).unwrap(),
            RingEvent::Play(6, PathBuf::from("/b.mp3"))
        );
    }
}
