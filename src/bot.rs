//! Chat bot: on-demand and scheduled scans, market recaps
//!
//! The decision logic is [`poll_step`], a pure function from (state,
//! updates, clock) to (new state, actions). [`run`] wraps it in a tokio
//! long-polling loop that executes the actions against the messaging API.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{BotConfig, Config};
use crate::recap;
use crate::scanner;
use crate::state::SqliteStateStore;
use crate::telegram::{TelegramClient, Update};

pub const HELP_TEXT: &str = "Commands:\n\
    signal - scan for today's best setup\n\
    recap - end of day movers\n\
    help - this message";

const SCAN_ACK: &str = "Scanning for high-probability setups...";
const RECAP_ACK: &str = "Generating market recap...";
const SCAN_BUSY: &str = "Scan already in progress, please wait.";

// =============================================================================
// State and Commands
// =============================================================================

/// Persistent polling state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotState {
    /// Next update id to request
    pub update_offset: i64,
    /// Day the scheduled alert last fired
    pub last_alert_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Signal,
    Recap,
    Help,
}

impl Command {
    /// Case-insensitive keyword match anywhere in the text
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.to_lowercase();
        if text.contains("signal") {
            Some(Command::Signal)
        } else if text.contains("recap") {
            Some(Command::Recap)
        } else if text.contains("help") || text.trim_start().starts_with("/start") {
            Some(Command::Help)
        } else {
            None
        }
    }
}

/// What triggered an outgoing alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Scan,
    Scheduled,
    Recap,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Scan => "scan",
            AlertKind::Scheduled => "scheduled",
            AlertKind::Recap => "recap",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Reply { chat_id: i64, text: String },
    Scan { chat_id: i64, kind: AlertKind },
    Recap { chat_id: i64 },
}

/// Daily alert schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub alert_time: NaiveTime,
    pub weekdays_only: bool,
}

impl Schedule {
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        Ok(Schedule {
            alert_time: config.alert_time()?,
            weekdays_only: config.weekdays_only,
        })
    }

    /// Due once per day, at or after the alert time
    pub fn is_due(&self, state: &BotState, now: NaiveDateTime) -> bool {
        let today = now.date();
        if self.weekdays_only && matches!(today.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        now.time() >= self.alert_time && state.last_alert_date != Some(today)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub state: BotState,
    pub actions: Vec<Action>,
}

/// Advance the bot by one batch of updates.
///
/// The offset moves past every update, including ones from other chats and
/// non-text updates, which are otherwise ignored.
pub fn poll_step(
    state: &BotState,
    updates: &[Update],
    now: NaiveDateTime,
    schedule: &Schedule,
    chat_id: i64,
) -> PollOutcome {
    let mut next = state.clone();
    let mut actions = Vec::new();

    for update in updates {
        next.update_offset = next.update_offset.max(update.update_id + 1);

        let Some(message) = &update.message else {
            continue;
        };
        if message.chat.id != chat_id {
            debug!("Ignoring update {} from chat {}", update.update_id, message.chat.id);
            continue;
        }
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            continue;
        };

        match command {
            Command::Signal => {
                actions.push(Action::Reply {
                    chat_id,
                    text: SCAN_ACK.to_string(),
                });
                actions.push(Action::Scan {
                    chat_id,
                    kind: AlertKind::Scan,
                });
            }
            Command::Recap => {
                actions.push(Action::Reply {
                    chat_id,
                    text: RECAP_ACK.to_string(),
                });
                actions.push(Action::Recap { chat_id });
            }
            Command::Help => actions.push(Action::Reply {
                chat_id,
                text: HELP_TEXT.to_string(),
            }),
        }
    }

    if schedule.is_due(&next, now) {
        next.last_alert_date = Some(now.date());
        actions.push(Action::Scan {
            chat_id,
            kind: AlertKind::Scheduled,
        });
    }

    PollOutcome {
        state: next,
        actions,
    }
}

// =============================================================================
// Scan Slot
// =============================================================================

/// Single in-flight scan guard. The slot stays busy until the
/// [`ScanPermit`] is dropped, so a permit moved into a blocking job keeps it
/// busy for as long as that job runs, timeouts included.
#[derive(Debug, Clone, Default)]
pub struct ScanSlot {
    busy: Arc<AtomicBool>,
}

impl ScanSlot {
    pub fn try_acquire(&self) -> Option<ScanPermit> {
        if self.busy.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(ScanPermit {
                busy: self.busy.clone(),
            })
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ScanPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Result of asking for a scan
#[derive(Debug)]
pub enum ScanStart {
    Started(ScanPermit),
    /// On-demand request while another scan runs
    Busy,
    /// Scheduled alert held until the slot frees up
    Deferred,
}

/// Scan admission: one scan at a time, and a scheduled alert that finds the
/// slot busy is kept for later instead of dropped
#[derive(Debug, Default)]
pub struct ScanQueue {
    slot: ScanSlot,
    deferred: Option<i64>,
}

impl ScanQueue {
    pub fn request(&mut self, chat_id: i64, kind: AlertKind) -> ScanStart {
        match self.slot.try_acquire() {
            Some(permit) => ScanStart::Started(permit),
            None if kind == AlertKind::Scheduled => {
                self.deferred = Some(chat_id);
                ScanStart::Deferred
            }
            None => ScanStart::Busy,
        }
    }

    /// Deferred scheduled alert, once the slot is free
    pub fn resume_deferred(&mut self) -> Option<(i64, ScanPermit)> {
        let chat_id = self.deferred?;
        let permit = self.slot.try_acquire()?;
        self.deferred = None;
        Some((chat_id, permit))
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }
}

// =============================================================================
// Async Runtime
// =============================================================================

struct Bot {
    config: Arc<Config>,
    client: TelegramClient,
    store: Arc<SqliteStateStore>,
    chat_id: i64,
    schedule: Schedule,
    state: BotState,
    scans: ScanQueue,
}

impl Bot {
    fn new(config: Config) -> Result<Self> {
        let token = config
            .bot
            .token
            .clone()
            .context("BOT_TOKEN is not set (env or config bot.token)")?;
        let chat_id = config
            .bot
            .chat_id
            .context("CHAT_ID is not set (env or config bot.chat_id)")?;

        let client = TelegramClient::new(&token, config.bot.long_poll_secs)?;
        let store = SqliteStateStore::open(&config.bot.state_db)?;
        let state = store.load_state()?;
        let schedule = Schedule::from_config(&config.bot)?;

        info!(
            "Resuming at offset {} (last alert {:?})",
            state.update_offset, state.last_alert_date
        );

        Ok(Bot {
            config: Arc::new(config),
            client,
            store: Arc::new(store),
            chat_id,
            schedule,
            state,
            scans: ScanQueue::default(),
        })
    }

    async fn cycle(&mut self) -> Result<()> {
        let updates = self
            .client
            .get_updates(self.state.update_offset, self.config.bot.long_poll_secs)
            .await?;

        let now = chrono::Local::now().naive_local();
        let outcome = poll_step(&self.state, &updates, now, &self.schedule, self.chat_id);

        if outcome.state != self.state {
            self.store.save_state(&outcome.state)?;
            self.state = outcome.state;
        }

        if let Some((chat_id, permit)) = self.scans.resume_deferred() {
            info!("Running deferred scheduled alert");
            self.launch_scan(chat_id, AlertKind::Scheduled, permit);
        }

        for action in outcome.actions {
            self.execute(action).await;
        }
        Ok(())
    }

    async fn execute(&mut self, action: Action) {
        match action {
            Action::Reply { chat_id, text } => {
                if let Err(e) = self.client.send_message(chat_id, &text).await {
                    error!("Reply failed: {:#}", e);
                }
            }
            Action::Scan { chat_id, kind } => self.spawn_scan(chat_id, kind).await,
            Action::Recap { chat_id } => self.spawn_recap(chat_id),
        }
    }

    async fn spawn_scan(&mut self, chat_id: i64, kind: AlertKind) {
        match self.scans.request(chat_id, kind) {
            ScanStart::Started(permit) => self.launch_scan(chat_id, kind, permit),
            ScanStart::Deferred => info!("Scheduled alert deferred: scan in progress"),
            ScanStart::Busy => {
                warn!("Scan requested while another is running");
                if let Err(e) = self.client.send_message(chat_id, SCAN_BUSY).await {
                    error!("Reply failed: {:#}", e);
                }
            }
        }
    }

    fn launch_scan(&self, chat_id: i64, kind: AlertKind, permit: ScanPermit) {
        let config = self.config.clone();
        let client = self.client.clone();
        let store = self.store.clone();
        let limit = Duration::from_secs(config.bot.scan_timeout_secs);

        tokio::spawn(async move {
            // The permit lives as long as the blocking job, not the timeout
            let job = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                scanner::scan_from_config(&config)
            });

            let text = match tokio::time::timeout(limit, job).await {
                Ok(Ok(Ok(outcome))) => outcome.to_string(),
                Ok(Ok(Err(e))) => format!("Scanner failed:\n{:#}", e),
                Ok(Err(e)) => format!("Scanner crashed:\n{}", e),
                Err(_) => {
                    warn!("Scan exceeded {}s; slot stays busy until it returns", limit.as_secs());
                    format!("Scanner timed out after {}s", limit.as_secs())
                }
            };

            deliver(&client, &store, chat_id, kind, &text).await;
        });
    }

    fn spawn_recap(&self, chat_id: i64) {
        let config = self.config.clone();
        let client = self.client.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let job = tokio::task::spawn_blocking(move || recap::recap_from_config(&config));
            let text = match job.await {
                Ok(Ok(report)) => report.to_string(),
                Ok(Err(e)) => format!("Recap error:\n{:#}", e),
                Err(e) => format!("Recap crashed:\n{}", e),
            };
            deliver(&client, &store, chat_id, AlertKind::Recap, &text).await;
        });
    }
}

async fn deliver(
    client: &TelegramClient,
    store: &SqliteStateStore,
    chat_id: i64,
    kind: AlertKind,
    text: &str,
) {
    match client.send_message(chat_id, text).await {
        Ok(()) => {
            let summary = text.lines().take(6).collect::<Vec<_>>().join(" / ");
            if let Err(e) = store.record_alert(chat_id, kind, &summary) {
                warn!("Could not record alert: {:#}", e);
            }
            info!("Sent {} alert to {}", kind.as_str(), chat_id);
        }
        Err(e) => error!("Sending {} alert failed: {:#}", kind.as_str(), e),
    }
}

/// Poll until ctrl-c
pub async fn run(config: Config) -> Result<()> {
    let mut bot = Bot::new(config)?;
    let retry_delay = Duration::from_secs(bot.config.bot.poll_interval_secs);

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_flag_clone.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => error!("Error setting up signal handler: {}", e),
        }
    });

    info!(
        "Bot polling chat {} (daily alert at {})",
        bot.chat_id, bot.schedule.alert_time
    );

    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::select! {
            result = bot.cycle() => {
                if let Err(e) = result {
                    error!("Polling cycle error: {:#}", e);
                    sleep(retry_delay).await;
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    bot.store.save_state(&bot.state)?;
    info!("Bot stopped at offset {}", bot.state.update_offset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{Chat, Message};
    use chrono::NaiveDate;

    const CHAT: i64 = 42;

    fn update(id: i64, chat: i64, text: &str) -> Update {
        Update {
            update_id: id,
            message: Some(Message {
                chat: Chat { id: chat },
                text: Some(text.to_string()),
            }),
        }
    }

    fn schedule() -> Schedule {
        Schedule {
            alert_time: NaiveTime::from_hms_opt(16, 15, 0).unwrap(),
            weekdays_only: true,
        }
    }

    // 2024-06-03 is a Monday
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("Any SIGNAL today?"), Some(Command::Signal));
        assert_eq!(Command::parse("recap pls"), Some(Command::Recap));
        assert_eq!(Command::parse("/start"), Some(Command::Help));
        assert_eq!(Command::parse("hello"), None);
        // "signal" takes precedence over "recap"
        assert_eq!(Command::parse("recap and signal"), Some(Command::Signal));
    }

    #[test]
    fn test_offset_advances_past_ignored_updates() {
        let updates = vec![
            update(10, 7, "signal"),
            Update {
                update_id: 11,
                message: None,
            },
            update(12, CHAT, "hello"),
        ];
        let out = poll_step(&BotState::default(), &updates, at(3, 9, 0), &schedule(), CHAT);
        assert_eq!(out.state.update_offset, 13);
        assert!(out.actions.is_empty());
    }

    #[test]
    fn test_signal_acknowledges_then_scans() {
        let out = poll_step(
            &BotState::default(),
            &[update(1, CHAT, "signal")],
            at(3, 9, 0),
            &schedule(),
            CHAT,
        );
        assert_eq!(
            out.actions,
            vec![
                Action::Reply {
                    chat_id: CHAT,
                    text: SCAN_ACK.to_string()
                },
                Action::Scan {
                    chat_id: CHAT,
                    kind: AlertKind::Scan
                },
            ]
        );
    }

    #[test]
    fn test_scheduled_alert_fires_once_per_day() {
        let state = BotState::default();
        let before = poll_step(&state, &[], at(3, 16, 14), &schedule(), CHAT);
        assert!(before.actions.is_empty());

        let due = poll_step(&state, &[], at(3, 16, 15), &schedule(), CHAT);
        assert_eq!(
            due.actions,
            vec![Action::Scan {
                chat_id: CHAT,
                kind: AlertKind::Scheduled
            }]
        );
        assert_eq!(due.state.last_alert_date, NaiveDate::from_ymd_opt(2024, 6, 3));

        let again = poll_step(&due.state, &[], at(3, 18, 0), &schedule(), CHAT);
        assert!(again.actions.is_empty());

        let next_day = poll_step(&due.state, &[], at(4, 16, 30), &schedule(), CHAT);
        assert_eq!(next_day.actions.len(), 1);
    }

    #[test]
    fn test_no_scheduled_alert_on_weekend() {
        // 2024-06-08 is a Saturday
        let out = poll_step(&BotState::default(), &[], at(8, 17, 0), &schedule(), CHAT);
        assert!(out.actions.is_empty());

        let every_day = Schedule {
            weekdays_only: false,
            ..schedule()
        };
        let out = poll_step(&BotState::default(), &[], at(8, 17, 0), &every_day, CHAT);
        assert_eq!(out.actions.len(), 1);
    }

    #[test]
    fn test_scan_slot_admits_one_scan() {
        let mut scans = ScanQueue::default();

        let ScanStart::Started(permit) = scans.request(CHAT, AlertKind::Scan) else {
            panic!("first scan should start");
        };
        assert!(matches!(scans.request(CHAT, AlertKind::Scan), ScanStart::Busy));
        assert!(scans.is_busy());

        drop(permit);
        assert!(!scans.is_busy());
        assert!(matches!(scans.request(CHAT, AlertKind::Scan), ScanStart::Started(_)));
    }

    #[test]
    fn test_scheduled_alert_waits_for_running_scan() {
        let mut scans = ScanQueue::default();
        let ScanStart::Started(permit) = scans.request(CHAT, AlertKind::Scan) else {
            panic!("first scan should start");
        };

        assert!(matches!(
            scans.request(CHAT, AlertKind::Scheduled),
            ScanStart::Deferred
        ));
        assert!(scans.has_deferred());
        assert!(scans.resume_deferred().is_none());

        drop(permit);
        let (chat_id, _permit) = scans.resume_deferred().unwrap();
        assert_eq!(chat_id, CHAT);
        assert!(!scans.has_deferred());
        assert!(scans.is_busy());
    }

    #[tokio::test]
    async fn test_timed_out_scan_keeps_slot_busy() {
        let mut scans = ScanQueue::default();
        let ScanStart::Started(permit) = scans.request(CHAT, AlertKind::Scan) else {
            panic!("first scan should start");
        };

        let mut job = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            std::thread::sleep(Duration::from_millis(200));
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(10), &mut job).await;
        assert!(timed_out.is_err());
        assert!(matches!(scans.request(CHAT, AlertKind::Scan), ScanStart::Busy));

        job.await.unwrap();
        assert!(!scans.is_busy());
    }

    #[test]
    fn test_offset_never_moves_backwards() {
        let state = BotState {
            update_offset: 100,
            last_alert_date: None,
        };
        let out = poll_step(&state, &[update(50, CHAT, "help")], at(3, 9, 0), &schedule(), CHAT);
        assert_eq!(out.state.update_offset, 100);
    }
}
