//! The background controller.
//!
//! The controller owns every state transition. Panels talk to it through a
//! [`ControllerHandle`]; it processes one event at a time from a queue, so
//! messages, alarm ticks and lifecycle events never interleave.
//!
//! ```text
//! Quick Panel ──┐                        ┌── SettingsStore
//!               ├─ Message ─► Controller ┼── PacFetcher / StatusProbe
//! Settings Panel┘      ▲          │      └── ProxyBackend
//!                      │          ▼
//!             ReconnectAlarm   StatusReporter ─► Broadcast ─► panels
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::ProxyBackend;
use crate::error::{CoreError, Result};
use crate::mode::{ProxyConfig, ProxyMode};
use crate::pac::{load_pac, PacFetcher, PacScript};
use crate::schedule::{format_interval, ReconnectAlarm, RECONNECT_ALARM};
use crate::settings::{Settings, SettingsPatch, SettingsStore, KEY_PROXY_MODE};
use crate::status::{
    Broadcast, StatusProbe, StatusReporter, StatusSnapshot, CHECK_FAILED_MESSAGE,
    FETCH_FAILED_MESSAGE,
};

/// Default depth of the controller's event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Depth of the event queue.
    pub queue_capacity: usize,
    /// Apply direct routing when the controller shuts down.
    pub restore_direct_on_shutdown: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            restore_direct_on_shutdown: true,
        }
    }
}

/// Commands sent by the panels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Load the remote script if only the default is cached.
    InitializeProxy,
    /// Switch routing mode.
    ModeChange { mode: ProxyMode },
    /// Re-fetch the script and re-enter smart mode.
    ReloadProxyConfig,
    /// Same as [`Message::ReloadProxyConfig`], sent after settings are saved.
    UpdateProxySettings,
    /// Run a connectivity check.
    CheckProxyStatus,
    /// Save settings panel edits.
    UpdateSettings { settings: SettingsPatch },
    /// Read the stored settings.
    GetSettings,
    /// Read the last broadcast status.
    GetStatus,
}

/// Controller replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Settings(Settings),
    Status(Option<StatusSnapshot>),
}

enum Event {
    Message(Message),
    Boot,
    AlarmFired,
    Shutdown,
}

struct Envelope {
    event: Event,
    reply: Option<oneshot::Sender<Result<Reply>>>,
}

/// Cloneable handle for talking to a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Envelope>,
    reporter: StatusReporter,
}

impl ControllerHandle {
    /// Sends a panel message and waits for the reply.
    pub async fn send(&self, message: Message) -> Result<Reply> {
        self.request(Event::Message(message)).await
    }

    /// Runs the install/startup sequence. Returns the settings in effect.
    pub async fn boot(&self) -> Result<Settings> {
        expect_settings(self.request(Event::Boot).await?)
    }

    /// Stops the controller after clearing the alarm.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Event::Shutdown).await.map(|_| ())
    }

    /// Reads the stored settings.
    pub async fn settings(&self) -> Result<Settings> {
        expect_settings(self.send(Message::GetSettings).await?)
    }

    /// Saves settings panel edits.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        expect_settings(self.send(Message::UpdateSettings { settings: patch }).await?)
    }

    /// Switches routing mode.
    pub async fn set_mode(&self, mode: ProxyMode) -> Result<()> {
        self.send(Message::ModeChange { mode }).await.map(|_| ())
    }

    /// Re-fetches the PAC script.
    pub async fn reload(&self) -> Result<()> {
        self.send(Message::ReloadProxyConfig).await.map(|_| ())
    }

    /// Runs a connectivity check.
    pub async fn check_status(&self) -> Result<StatusSnapshot> {
        match self.send(Message::CheckProxyStatus).await? {
            Reply::Status(Some(snapshot)) => Ok(snapshot),
            other => Err(CoreError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    /// Subscribes to broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.reporter.subscribe()
    }

    /// The last status broadcast.
    pub fn last_status(&self) -> Option<StatusSnapshot> {
        self.reporter.last_status()
    }

    /// Returns true once the controller has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request(&self, event: Event) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| CoreError::ControllerClosed)?;

        reply_rx.await.map_err(|_| CoreError::ControllerClosed)?
    }
}

fn expect_settings(reply: Reply) -> Result<Settings> {
    match reply {
        Reply::Settings(settings) => Ok(settings),
        other => Err(CoreError::UnexpectedReply(format!("{:?}", other))),
    }
}

/// Owns the proxy state and reacts to events.
pub struct Controller {
    store: Arc<dyn SettingsStore>,
    backend: Arc<dyn ProxyBackend>,
    fetcher: Arc<dyn PacFetcher>,
    probe: Arc<dyn StatusProbe>,
    reporter: StatusReporter,
    config: ControllerConfig,
    pac: PacScript,
    alarm: ReconnectAlarm,
    alarm_tx: Option<mpsc::WeakSender<Envelope>>,
}

impl Controller {
    /// Creates a controller over the given host collaborators.
    pub fn new(
        store: Arc<dyn SettingsStore>,
        backend: Arc<dyn ProxyBackend>,
        fetcher: Arc<dyn PacFetcher>,
        probe: Arc<dyn StatusProbe>,
    ) -> Self {
        Self {
            store,
            backend,
            fetcher,
            probe,
            reporter: StatusReporter::new(),
            config: ControllerConfig::default(),
            pac: PacScript::Default,
            alarm: ReconnectAlarm::new(),
            alarm_tx: None,
        }
    }

    /// Sets the controller tuning.
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing reporter (shares its subscribers).
    pub fn with_reporter(mut self, reporter: StatusReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Starts the event loop.
    ///
    /// The loop ends on shutdown or once every handle is dropped.
    pub fn spawn(mut self) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        self.alarm_tx = Some(tx.downgrade());

        let handle = ControllerHandle {
            tx,
            reporter: self.reporter.clone(),
        };
        let task = tokio::spawn(self.run(rx));

        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        info!(backend = self.backend.name(), "Controller started");

        while let Some(envelope) = rx.recv().await {
            let is_shutdown = matches!(envelope.event, Event::Shutdown);
            let result = self.handle(envelope.event).await;

            match envelope.reply {
                Some(reply) => {
                    // The requester may have gone away.
                    let _ = reply.send(result);
                }
                None => {
                    if let Err(e) = result {
                        warn!(error = %e, "Event failed");
                    }
                }
            }

            if is_shutdown {
                break;
            }
        }

        self.alarm.clear();
        info!("Controller stopped");
    }

    async fn handle(&mut self, event: Event) -> Result<Reply> {
        match event {
            Event::Boot => self.boot().await.map(Reply::Settings),
            Event::AlarmFired => {
                self.on_alarm().await;
                Ok(Reply::Ack)
            }
            Event::Shutdown => {
                self.shutdown().await?;
                Ok(Reply::Ack)
            }
            Event::Message(message) => self.handle_message(message).await,
        }
    }

    async fn handle_message(&mut self, message: Message) -> Result<Reply> {
        debug!(?message, "Handling message");

        match message {
            Message::InitializeProxy => {
                self.initialize().await?;
                Ok(Reply::Ack)
            }
            Message::ModeChange { mode } => {
                self.change_mode(mode).await?;
                Ok(Reply::Ack)
            }
            Message::ReloadProxyConfig | Message::UpdateProxySettings => {
                self.reload_and_check().await?;
                Ok(Reply::Ack)
            }
            Message::CheckProxyStatus => Ok(Reply::Status(Some(self.check_status().await))),
            Message::UpdateSettings { settings } => {
                self.update_settings(settings).map(Reply::Settings)
            }
            Message::GetSettings => self.settings().map(Reply::Settings),
            Message::GetStatus => Ok(Reply::Status(self.reporter.last_status())),
        }
    }

    fn settings(&self) -> Result<Settings> {
        Settings::load(self.store.as_ref())
    }

    async fn boot(&mut self) -> Result<Settings> {
        let first_run = !self.store.contains(KEY_PROXY_MODE)?;

        let mut settings = self.settings()?;
        if first_run {
            info!("No stored proxy mode, writing defaults");
            settings.proxy_mode = ProxyMode::Smart;
            settings.save(self.store.as_ref())?;
        }

        let applied = self.apply_mode(settings.proxy_mode).await;
        if first_run {
            self.reporter.mode_changed(settings.proxy_mode);
        }
        self.reconcile_alarm(&settings);

        // The controller keeps running without OS integration; panels can
        // retry through MODE_CHANGE or a reload.
        if applied.is_err() {
            warn!(
                mode = %settings.proxy_mode,
                "Booted without applying the proxy configuration"
            );
        }

        info!(
            mode = %settings.proxy_mode,
            first_run,
            "Controller booted"
        );
        Ok(settings)
    }

    async fn initialize(&mut self) -> Result<()> {
        if !self.pac.is_default() {
            debug!("PAC script already loaded");
            return Ok(());
        }

        let settings = self.settings()?;
        if !settings.proxy_mode.is_smart() {
            debug!("Direct mode, deferring PAC load");
            return Ok(());
        }

        self.reload_and_check().await
    }

    async fn change_mode(&mut self, mode: ProxyMode) -> Result<()> {
        Settings::save_mode(self.store.as_ref(), mode)?;

        let applied = self.apply_mode(mode).await;
        self.reporter.mode_changed(mode);

        let settings = self.settings()?;
        self.reconcile_alarm(&settings);

        applied?;
        info!(%mode, "Proxy mode changed");
        Ok(())
    }

    async fn apply_mode(&self, mode: ProxyMode) -> Result<()> {
        let config = ProxyConfig::for_mode(mode, &self.pac);

        if let Err(e) = self.backend.apply(&config).await {
            error!(
                backend = self.backend.name(),
                %mode,
                error = %e,
                "Failed to apply proxy configuration"
            );
            return Err(e);
        }

        info!(
            backend = self.backend.name(),
            %mode,
            using_default = self.pac.is_default(),
            "Applied proxy configuration"
        );
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        let mut settings = self.settings()?;
        let url = settings.effective_config_url().to_string();
        info!(%url, "Reloading proxy configuration");

        let outcome = match load_pac(self.fetcher.as_ref(), &url).await {
            Ok(pac) => {
                info!(bytes = pac.source().len(), "Proxy configuration reloaded");
                self.pac = pac;
                Ok(())
            }
            Err(e) => {
                error!(%url, error = %e, "Failed to load proxy configuration, falling back to direct script");
                self.pac = PacScript::Default;
                self.reporter
                    .status(StatusSnapshot::failure(FETCH_FAILED_MESSAGE, true));
                Err(e)
            }
        };

        // Reloading always re-enters smart mode, even after a failed fetch.
        let applied = self.apply_mode(ProxyMode::Smart).await;
        let saved = Settings::save_mode(self.store.as_ref(), ProxyMode::Smart);
        self.reporter.mode_changed(ProxyMode::Smart);

        settings.proxy_mode = ProxyMode::Smart;
        self.reconcile_alarm(&settings);

        outcome?;
        saved?;
        applied
    }

    async fn reload_and_check(&mut self) -> Result<()> {
        self.reload().await?;
        self.check_status().await;
        Ok(())
    }

    async fn check_status(&self) -> StatusSnapshot {
        let is_using_default = self.pac.is_default();

        let snapshot = match self.probe.probe().await {
            Ok(info) => {
                info!(
                    ip = info.ip.as_deref().unwrap_or("-"),
                    country = info.country.as_deref().unwrap_or("-"),
                    is_using_default,
                    "Connectivity check complete"
                );
                StatusSnapshot::from_info(info, is_using_default)
            }
            Err(e) => {
                warn!(error = %e, "Connectivity check failed");
                StatusSnapshot::failure(CHECK_FAILED_MESSAGE, is_using_default)
            }
        };

        self.reporter.status(snapshot.clone());
        snapshot
    }

    fn update_settings(&mut self, patch: SettingsPatch) -> Result<Settings> {
        patch.validate()?;

        let mut settings = self.settings()?;
        let change = settings.apply(&patch);
        if change.any() {
            settings.save(self.store.as_ref())?;
            info!(?change, "Settings updated");
        }

        self.reconcile_alarm(&settings);
        Ok(settings)
    }

    async fn on_alarm(&mut self) {
        info!(alarm = RECONNECT_ALARM, "Reconnect alarm fired");

        let settings = match self.settings() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Could not read settings for reconnect");
                return;
            }
        };

        if !settings.should_auto_reconnect() {
            // A tick queued before the alarm was cleared.
            self.reconcile_alarm(&settings);
            return;
        }

        if let Err(e) = self.reload_and_check().await {
            warn!(error = %e, "Automatic reconnect failed");
        }
    }

    /// Arms the alarm iff mode is smart and auto-reconnect is on.
    fn reconcile_alarm(&mut self, settings: &Settings) {
        if !settings.should_auto_reconnect() {
            if self.alarm.clear() {
                info!(
                    mode = %settings.proxy_mode,
                    auto_reconnect = settings.auto_reconnect,
                    "Auto reconnect disabled"
                );
            }
            return;
        }

        let period = settings.reconnect_period();
        if self.alarm.period() == Some(period) {
            return;
        }

        let Some(weak_tx) = self.alarm_tx.clone() else {
            warn!("Controller is not running, cannot arm reconnect alarm");
            return;
        };

        self.alarm.arm(period, move || {
            let weak_tx = weak_tx.clone();
            async move {
                match weak_tx.upgrade() {
                    Some(tx) => tx
                        .send(Envelope {
                            event: Event::AlarmFired,
                            reply: None,
                        })
                        .await
                        .is_ok(),
                    None => false,
                }
            }
        });

        info!(
            "Auto reconnect enabled, checking every {}",
            format_interval(settings.effective_interval_minutes())
        );
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.alarm.clear();

        if self.config.restore_direct_on_shutdown {
            info!("Restoring direct routing");
            self.backend.apply(&ProxyConfig::Direct).await?;
        }

        Ok(())
    }
}
