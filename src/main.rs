use std::{
    error::Error,
    fs,
    io::{self, BufRead},
    path::{Path, PathBuf},
    thread,
};

use chrono::NaiveTime;
use clap::{command, Parser, Subcommand};
use zzpal::{
    config::Sound,
    daemon::Daemon,
    logging::LogContext,
    power::PowerManager,
    receiver::AlarmReceiver,
    ringing::{RingingService, Speaker},
    schedule::{AlarmHost, AlarmScheduler},
    store::AlarmStore,
    wakeup::WakeupTable,
    Alarm, AlarmBuilder, AlarmId, AlarmKind, AlarmViewModel, Config,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// config file to use instead of the one in the project config dir
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write the default config
    Init {
        #[clap(long, short)]
        force: bool,
    },
    NewSound {
        name: String,
        path: PathBuf,
    },
    /// ring at the next HH:MM
    AddFixed {
        time: String,
        #[clap(flatten)]
        options: AlarmOptions,
    },
    /// ring after the given hours and minutes
    AddElapsed {
        hours: u32,
        minutes: u32,
        #[clap(flatten)]
        options: AlarmOptions,
    },
    List,
    /// wake-ups waiting for the daemon
    Pending,
    Toggle {
        id: AlarmId,
    },
    Delete {
        id: AlarmId,
    },
    StartAll,
    StopAll,
    /// write every alarm to the log
    Dump,
    /// ring alarms as they come due, until `q` is entered
    Run,
}

#[derive(clap::Args)]
struct AlarmOptions {
    /// seconds to ring for
    #[clap(long, short)]
    duration: Option<u32>,
    #[clap(long)]
    vibrate: bool,
    /// name of a sound from the config, the default sound if not given
    #[clap(long, short, conflicts_with = "silent")]
    sound: Option<String>,
    #[clap(long)]
    silent: bool,
    #[clap(long, short)]
    enable: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let _log = LogContext::init()?;
    let args = Args::parse();
    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };

    match args.command.unwrap_or(Command::Run) {
        Command::Init { force } => init(&config_path, force)?,
        Command::NewSound { name, path } => {
            let mut config = Config::load_or_default(&config_path)?;
            let path = fs::canonicalize(path)?;
            let sound = Sound::new(name, path);
            println!("added sound {sound}");
            config.sounds.add(sound);
            config.save(&config_path)?;
        }
        Command::AddFixed { time, options } => {
            let config = Config::load_or_default(&config_path)?;
            let alarm = options.apply(AlarmBuilder::at_time(&time)?, &config)?;
            add(&config, alarm)?;
        }
        Command::AddElapsed {
            hours,
            minutes,
            options,
        } => {
            let config = Config::load_or_default(&config_path)?;
            let alarm = options.apply(AlarmBuilder::elapsed(hours, minutes), &config)?;
            add(&config, alarm)?;
        }
        Command::List => {
            let config = Config::load_or_default(&config_path)?;
            for alarm in view_model(&config)?.all_alarms() {
                println!("{}", list_line(&alarm, &config.time_format));
            }
        }
        Command::Pending => {
            let config = Config::load_or_default(&config_path)?;
            for wakeup in WakeupTable::in_dir(&config.data_dir()?).pending()? {
                println!(
                    "#{} at {}",
                    wakeup.payload.alarm_id,
                    wakeup.fire_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Toggle { id } => {
            let config = Config::load_or_default(&config_path)?;
            let enabled = view_model(&config)?.toggle_alarm(id).wait()?;
            println!("#{id} {}", if enabled { "enabled" } else { "disabled" });
        }
        Command::Delete { id } => {
            let config = Config::load_or_default(&config_path)?;
            if !view_model(&config)?.delete_alarm(id).wait()? {
                return Err(zzpal::Error::NotFound(id).into());
            }
            println!("deleted #{id}");
        }
        Command::StartAll => {
            let config = Config::load_or_default(&config_path)?;
            println!("started {}", view_model(&config)?.start_all().wait()?);
        }
        Command::StopAll => {
            let config = Config::load_or_default(&config_path)?;
            println!("stopped {}", view_model(&config)?.stop_all().wait()?);
        }
        Command::Dump => {
            let config = Config::load_or_default(&config_path)?;
            let count = view_model(&config)?.dump().wait()?;
            println!("dumped {count} alarms to the log");
        }
        Command::Run => run(&Config::load_or_default(&config_path)?)?,
    }
    Ok(())
}

impl AlarmOptions {
    fn apply(self, builder: AlarmBuilder, config: &Config) -> zzpal::Result<Alarm> {
        let builder = builder
            .duration_seconds(self.duration.unwrap_or(config.default_duration_seconds))
            .vibrate(self.vibrate)
            .enabled(self.enable);
        let builder = if self.silent {
            builder.silent()
        } else {
            let sound = match &self.sound {
                Some(name) => config.sounds.get(name)?,
                None => config.sounds.default_sound()?,
            };
            builder.sound(sound, &Config::sounds_path()?)
        };
        builder.build()
    }
}

fn init(config_path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    if config_path.exists() && !force {
        println!(
            "{} already exists, use --force to overwrite it",
            config_path.display()
        );
        return Ok(());
    }
    let config = Config::new();
    config.save(config_path)?;
    let sounds = Config::sounds_path()?;
    fs::create_dir_all(&sounds)?;
    fs::create_dir_all(config.data_dir()?)?;
    println!("wrote {}", config_path.display());
    println!("put alarm sounds in {}", sounds.display());
    Ok(())
}

fn view_model(config: &Config) -> zzpal::Result<AlarmViewModel> {
    let data_dir = config.data_dir()?;
    AlarmViewModel::new(
        AlarmStore::in_dir(&data_dir)?,
        AlarmScheduler::new(WakeupTable::in_dir(&data_dir)),
    )
}

fn add(config: &Config, alarm: Alarm) -> zzpal::Result<()> {
    let id = view_model(config)?.add_alarm(alarm.clone()).wait()?;
    println!("Alarm saved! #{id}: {alarm}");
    Ok(())
}

fn list_line(alarm: &Alarm, time_format: &str) -> String {
    let state = if alarm.enabled { "on " } else { "off" };
    let at = match alarm.kind() {
        AlarmKind::Fixed => NaiveTime::from_hms_opt(alarm.hours, alarm.minutes, 0)
            .map(|time| format!(" at {}", time.format(time_format)))
            .unwrap_or_default(),
        AlarmKind::Elapsed | AlarmKind::Recurring => String::new(),
    };
    format!("#{} [{state}] {alarm}{at} ({})", alarm.id, alarm.audio_text)
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let volume = config.volume;
    let ringing = RingingService::spawn(move || Speaker::open(volume))?;
    let receiver = AlarmReceiver::new(PowerManager::new(), ringing, config.wake_lock_timeout());
    let daemon = Daemon::new(
        WakeupTable::in_dir(&config.data_dir()?),
        receiver,
        config.poll_interval(),
    );

    let (stop, stopped) = crossbeam_channel::bounded(1);
    // a closed stdin (running detached) shouldn't stop the daemon
    let _keep_open = stop.clone();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines().map_while(Result::ok) {
                if matches!(line.trim(), "q" | "quit") {
                    let _ = stop.send(());
                    break;
                }
            }
        })?;
    println!("ringing alarms, enter q to stop");
    daemon.run(&stopped);
    Ok(())
}
