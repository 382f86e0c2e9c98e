use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{error, info, warn};

use crate::{error::Result, receiver::AlarmReceiver, wakeup::WakeupTable};

// wake-ups handled later than this get a warning
const LATE_AFTER: Duration = Duration::from_secs(5);

/// Watches the wake-up table and hands due alarms to the receiver.
#[derive(Debug)]
pub struct Daemon {
    table: WakeupTable,
    receiver: AlarmReceiver,
    poll_interval: Duration,
}

impl Daemon {
    #[must_use]
    pub const fn new(table: WakeupTable, receiver: AlarmReceiver, poll_interval: Duration) -> Self {
        Self {
            table,
            receiver,
            poll_interval,
        }
    }

    #[must_use]
    pub const fn receiver(&self) -> &AlarmReceiver {
        &self.receiver
    }

    /// fires everything due at `now` and gives how many fired
    pub fn tick(&self, now: NaiveDateTime) -> Result<usize> {
        let due = self.table.take_due(now)?;
        for wakeup in &due {
            let late = (now - wakeup.fire_at).to_std().unwrap_or_default();
            if late > LATE_AFTER {
                warn!(
                    "alarm #{} is {}s late",
                    wakeup.payload.alarm_id,
                    late.as_secs()
                );
            }
            // the receiver logs its own failures, one bad alarm doesn't stop the rest
            let _ = self.receiver.on_receive(&wakeup.payload);
        }
        Ok(due.len())
    }

    /// Polls until `stop` gets a message or is dropped, then waits for
    /// outstanding wake locks before returning.
    pub fn run(&self, stop: &Receiver<()>) {
        info!("watching {}", self.table.path().display());
        loop {
            if let Err(e) = self.tick(Local::now().naive_local()) {
                error!("couldn't check wake-ups: {e}");
            }
            match stop.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("stopping");
        if !self
            .receiver
            .power()
            .wait_released(self.receiver.lock_timeout())
        {
            warn!("wake lock still held on exit");
        }
    }
}
