use std::time::Duration;

use log::{error, info, warn};

use crate::{error::Result, power::PowerManager, ringing::RingingService, wakeup::FirePayload};

pub const WAKE_LOCK_TAG: &str = "zzpal:AlarmWakeLock";

/// Called when a wake-up comes due. Holds a wake lock while the alarm is
/// handed to the ringing worker; the ringing itself runs without it.
#[derive(Debug)]
pub struct AlarmReceiver {
    power: PowerManager,
    ringing: RingingService,
    lock_timeout: Duration,
}

impl AlarmReceiver {
    #[must_use]
    pub const fn new(power: PowerManager, ringing: RingingService, lock_timeout: Duration) -> Self {
        Self {
            power,
            ringing,
            lock_timeout,
        }
    }

    #[must_use]
    pub const fn power(&self) -> &PowerManager {
        &self.power
    }

    #[must_use]
    pub const fn ringing(&self) -> &RingingService {
        &self.ringing
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn on_receive(&self, payload: &FirePayload) -> Result<()> {
        // released when this returns, on every path
        let _lock = match self.power.acquire(WAKE_LOCK_TAG, self.lock_timeout) {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!("alarm #{} fires without a wake lock: {e}", payload.alarm_id);
                None
            }
        };
        info!("Alarm received! #{}", payload.alarm_id);
        self.ringing.start(payload).map_err(|e| {
            error!("Error starting service: {e}");
            e
        })
    }
}
