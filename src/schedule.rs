use chrono::{Duration, Local, NaiveDateTime};
use log::info;

use crate::{
    alarm::{Alarm, AlarmId, AlarmKind},
    error::{Error, Result},
    wakeup::{FirePayload, Wakeup},
};

/// The service that keeps pending wake-ups and eventually delivers them.
pub trait AlarmHost {
    /// upsert, keyed by the payload's alarm id
    fn register(&self, wakeup: Wakeup) -> Result<()>;
    /// no-op if nothing is pending for `id`
    fn cancel(&self, id: AlarmId) -> Result<()>;
    fn pending(&self) -> Result<Vec<Wakeup>>;
}

/// When `alarm` should ring if it is scheduled at `now`.
///
/// A fixed alarm rings today at `hours:minutes`, or tomorrow if that is not
/// after `now`. Elapsed and recurring alarms ring `hours` and `minutes` from now.
pub fn fire_time(alarm: &Alarm, now: NaiveDateTime) -> Result<NaiveDateTime> {
    match alarm.kind() {
        AlarmKind::Fixed => {
            let today = now
                .date()
                .and_hms_opt(alarm.hours, alarm.minutes, 0)
                .ok_or(Error::InvalidTime {
                    hours: alarm.hours,
                    minutes: alarm.minutes,
                })?;
            if today > now {
                Ok(today)
            } else {
                today
                    .checked_add_signed(Duration::days(1))
                    .ok_or(Error::TimeOverflow)
            }
        }
        AlarmKind::Elapsed | AlarmKind::Recurring => now
            .checked_add_signed(Duration::hours(i64::from(alarm.hours)))
            .and_then(|t| t.checked_add_signed(Duration::minutes(i64::from(alarm.minutes))))
            .ok_or(Error::TimeOverflow),
    }
}

#[derive(Debug, Clone)]
pub struct AlarmScheduler<H> {
    host: H,
}

impl<H: AlarmHost> AlarmScheduler<H> {
    #[must_use]
    pub const fn new(host: H) -> Self {
        Self { host }
    }

    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    pub fn schedule(&self, alarm: &Alarm) -> Result<NaiveDateTime> {
        self.schedule_at(alarm, Local::now().naive_local())
    }

    /// registers `alarm`, replacing any earlier registration for its id
    pub fn schedule_at(&self, alarm: &Alarm, now: NaiveDateTime) -> Result<NaiveDateTime> {
        if alarm.id == 0 {
            return Err(Error::Unsaved);
        }
        let fire_at = fire_time(alarm, now)?;
        info!("#{}: {}", alarm.id, fire_at.format("%Y-%m-%d %H:%M"));
        self.host.register(Wakeup {
            fire_at,
            payload: FirePayload::from_alarm(alarm),
        })?;
        Ok(fire_at)
    }

    pub fn cancel(&self, id: AlarmId) -> Result<()> {
        info!("Stopping alarm #{id}");
        self.host.cancel(id)
    }
}
