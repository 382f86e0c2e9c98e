use crate::{alarm::AlarmId, wakeup::FirePayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub alarm_id: AlarmId,
}

impl Message {
    #[must_use]
    pub const fn new(kind: MessageType, alarm_id: AlarmId) -> Self {
        Self { kind, alarm_id }
    }

    #[must_use]
    pub fn triggered(payload: &FirePayload) -> Self {
        Self::new(
            MessageType::AlarmTriggered {
                duration_seconds: payload.duration_seconds,
                vibrate: payload.vibrate,
                audio_uri: payload.audio_uri.clone(),
            },
            payload.alarm_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    AlarmTriggered {
        duration_seconds: u32,
        vibrate: bool,
        audio_uri: String,
    },
    // if the alarm is disabled/removed before it is done ringing
    AlarmStopped,
}
