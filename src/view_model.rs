use std::{
    sync::{Arc, PoisonError, RwLock},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};
use log::{error, info};

use crate::{
    alarm::{diff, Alarm, AlarmId},
    error::{Error, Result},
    schedule::{AlarmHost, AlarmScheduler},
    store::AlarmStore,
};

/// Result of a queued change, can be waited on or ignored.
#[derive(Debug)]
#[must_use = "ignore it explicitly if the outcome doesn't matter"]
pub struct Pending<T> {
    reply: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    pub fn wait(self) -> Result<T> {
        self.reply.recv().unwrap_or(Err(Error::WorkerGone))
    }
}

enum Command {
    Add(Alarm, Sender<Result<AlarmId>>),
    Update(Alarm, Sender<Result<bool>>),
    Toggle(AlarmId, Sender<Result<bool>>),
    Delete(AlarmId, Sender<Result<bool>>),
    StartAll(Sender<Result<usize>>),
    StopAll(Sender<Result<usize>>),
    Dump(Sender<Result<usize>>),
    Subscribe(Sender<Vec<Alarm>>),
}

/// Alarm list for the user facing side. Every change goes through one
/// writer thread in the order it was asked for; reads come from the last
/// published snapshot.
#[derive(Debug)]
pub struct AlarmViewModel {
    commands: Option<Sender<Command>>,
    snapshot: Arc<RwLock<Vec<Alarm>>>,
    writer: Option<JoinHandle<()>>,
}

impl AlarmViewModel {
    pub fn new<H>(store: AlarmStore, scheduler: AlarmScheduler<H>) -> Result<Self>
    where
        H: AlarmHost + Send + 'static,
    {
        let snapshot = Arc::new(RwLock::new(store.list_all()));
        let (commands, receiver) = crossbeam_channel::unbounded();
        let writer = Writer {
            store,
            scheduler,
            snapshot: Arc::clone(&snapshot),
            subscribers: Vec::new(),
        };
        let writer = thread::Builder::new()
            .name("alarm-writer".to_string())
            .spawn(move || writer.run(&receiver))?;
        Ok(Self {
            commands: Some(commands),
            snapshot,
            writer: Some(writer),
        })
    }

    /// ordered by hours, then minutes
    #[must_use]
    pub fn all_alarms(&self) -> Vec<Alarm> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn get_alarm_by_id(&self, id: AlarmId) -> Option<Alarm> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// receives the current list right away and again whenever it changes
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Vec<Alarm>> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.send(Command::Subscribe(sender));
        receiver
    }

    /// saves a new alarm and schedules it if it is enabled
    pub fn add_alarm(&self, alarm: Alarm) -> Pending<AlarmId> {
        self.request(|reply| Command::Add(alarm, reply))
    }

    /// overwrites the alarm, then schedules or cancels it to match `enabled`
    pub fn update_alarm(&self, alarm: Alarm) -> Pending<bool> {
        self.request(|reply| Command::Update(alarm, reply))
    }

    /// gives the new `enabled` state
    pub fn toggle_alarm(&self, id: AlarmId) -> Pending<bool> {
        self.request(|reply| Command::Toggle(id, reply))
    }

    pub fn delete_alarm(&self, id: AlarmId) -> Pending<bool> {
        self.request(|reply| Command::Delete(id, reply))
    }

    /// schedules every enabled alarm, gives how many were scheduled
    pub fn start_all(&self) -> Pending<usize> {
        self.request(Command::StartAll)
    }

    /// cancels every enabled alarm, gives how many were cancelled
    pub fn stop_all(&self) -> Pending<usize> {
        self.request(Command::StopAll)
    }

    /// writes every alarm to the log
    pub fn dump(&self) -> Pending<usize> {
        self.request(Command::Dump)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<Result<T>>) -> Command) -> Pending<T> {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        self.send(make(reply));
        Pending { reply: receiver }
    }

    fn send(&self, command: Command) {
        // a dropped command drops its reply sender, waiting on it gives `WorkerGone`
        if let Some(commands) = &self.commands {
            if commands.send(command).is_err() {
                error!("alarm writer is gone");
            }
        }
    }
}

impl Drop for AlarmViewModel {
    /// finishes queued changes before returning
    fn drop(&mut self) {
        drop(self.commands.take());
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                error!("alarm writer panicked");
            }
        }
    }
}

struct Writer<H> {
    store: AlarmStore,
    scheduler: AlarmScheduler<H>,
    snapshot: Arc<RwLock<Vec<Alarm>>>,
    subscribers: Vec<Sender<Vec<Alarm>>>,
}

impl<H: AlarmHost> Writer<H> {
    fn run(mut self, commands: &Receiver<Command>) {
        for command in commands {
            match command {
                Command::Add(alarm, reply) => {
                    let result = self.add(alarm);
                    self.finish("add alarm", result, &reply);
                }
                Command::Update(alarm, reply) => {
                    let result = self.update(alarm);
                    self.finish("update alarm", result, &reply);
                }
                Command::Toggle(id, reply) => {
                    let result = self.toggle(id);
                    self.finish("toggle alarm", result, &reply);
                }
                Command::Delete(id, reply) => {
                    let result = self.delete(id);
                    self.finish("delete alarm", result, &reply);
                }
                Command::StartAll(reply) => {
                    let result = Ok(self.start_all());
                    self.finish("start alarms", result, &reply);
                }
                Command::StopAll(reply) => {
                    let result = Ok(self.stop_all());
                    self.finish("stop alarms", result, &reply);
                }
                Command::Dump(reply) => {
                    let result = Ok(self.dump());
                    self.finish("dump alarms", result, &reply);
                }
                Command::Subscribe(subscriber) => {
                    if subscriber.send(self.store.list_all()).is_ok() {
                        self.subscribers.push(subscriber);
                    }
                }
            }
        }
    }

    /// publishes before replying so a waiting caller sees its own change
    fn finish<T>(&mut self, what: &str, result: Result<T>, reply: &Sender<Result<T>>) {
        if let Err(e) = &result {
            error!("couldn't {what}: {e}");
        }
        self.publish();
        let _ = reply.send(result);
    }

    fn publish(&mut self) {
        let current = self.store.list_all();
        {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            if diff(&snapshot, &current).is_empty() {
                return;
            }
            snapshot.clone_from(&current);
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(current.clone()).is_ok());
    }

    fn add(&mut self, alarm: Alarm) -> Result<AlarmId> {
        let id = self.store.insert(alarm)?;
        info!("Alarm saved! #{id}");
        if let Some(alarm) = self.store.get(id).filter(|a| a.enabled) {
            self.schedule(&alarm);
        }
        Ok(id)
    }

    fn update(&mut self, alarm: Alarm) -> Result<bool> {
        if !self.store.update(alarm.clone())? {
            return Ok(false);
        }
        self.sync(&alarm);
        Ok(true)
    }

    fn toggle(&mut self, id: AlarmId) -> Result<bool> {
        let mut alarm = self.store.get(id).ok_or(Error::NotFound(id))?;
        alarm.enabled = !alarm.enabled;
        self.store.update(alarm.clone())?;
        self.sync(&alarm);
        Ok(alarm.enabled)
    }

    fn delete(&mut self, id: AlarmId) -> Result<bool> {
        info!("Deleting alarm #{id}");
        if self.store.get(id).is_none() {
            return Ok(false);
        }
        self.cancel(id);
        Ok(self.store.delete(id)?.is_some())
    }

    fn start_all(&self) -> usize {
        info!("Starting all alarms");
        self.store
            .list_all()
            .iter()
            .filter(|a| a.enabled)
            .filter(|a| self.schedule(a))
            .count()
    }

    fn stop_all(&self) -> usize {
        info!("Stopping all alarms");
        self.store
            .list_all()
            .iter()
            .filter(|a| a.enabled)
            .filter(|a| self.cancel(a.id))
            .count()
    }

    fn dump(&self) -> usize {
        let alarms = self.store.list_all();
        info!("Starting DB dump");
        for alarm in &alarms {
            info!("{}", alarm.details());
        }
        info!("DB dump ended");
        alarms.len()
    }

    /// registration follows `enabled`
    fn sync(&self, alarm: &Alarm) {
        if alarm.enabled {
            self.schedule(alarm);
        } else {
            self.cancel(alarm.id);
        }
    }

    fn schedule(&self, alarm: &Alarm) -> bool {
        match self.scheduler.schedule(alarm) {
            Ok(_) => true,
            Err(e) => {
                error!("couldn't schedule alarm #{}: {e}", alarm.id);
                false
            }
        }
    }

    fn cancel(&self, id: AlarmId) -> bool {
        match self.scheduler.cancel(id) {
            Ok(()) => true,
            Err(e) => {
                error!("couldn't cancel alarm #{id}: {e}");
                false
            }
        }
    }
}
