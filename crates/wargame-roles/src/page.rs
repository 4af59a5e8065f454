//! Role page lifecycle
//!
//! A [`RolePage`] is one open role screen. Opening it resolves the session,
//! runs the one-time legacy migration and loads the workspace; background
//! polling keeps it current until it is closed.
//!
//! Pages that do not control the game follow the shared game state; every
//! page refreshes its merged timeline and polls for updates from other
//! pages. Closing a page stops its loops and flushes one final save.

use crate::config::WargameConfig;
use crate::error::RoleResult;
use crate::schema::Mode;
use crate::workspace::Workspace;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use wargame_channel::{game_state_reader, GameState, ReadOnly, SubscriptionId, TimerDisplay, TimerReading};
use wargame_store::{ExportSink, LegacyMigrator, SessionId, SessionKeyStore, SessionResolver, StorageEvents};
use wargame_timeline::TimelineItem;

/// Options for opening a page
#[derive(Default)]
pub struct PageOptions<'a> {
    /// Page query string, e.g. `?sessionId=ex-1`
    pub query: Option<&'a str>,
    /// How stored records are validated
    pub mode: Mode,
    /// Receives the pre-migration backup
    pub backup_sink: Option<&'a dyn ExportSink>,
    /// Foreign storage changes for this page's context
    pub events: Option<StorageEvents>,
}

/// A live role page around a workspace
pub struct RolePage<W: Workspace + 'static> {
    store: Arc<SessionKeyStore>,
    session: SessionId,
    mode: Mode,
    workspace: Arc<Mutex<W>>,
    timeline: Arc<RwLock<Vec<TimelineItem>>>,
    timer: TimerDisplay,
    game_state: Option<(ReadOnly<GameState>, SubscriptionId)>,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl<W: Workspace + 'static> RolePage<W> {
    /// Resolve the session, migrate, build and load the workspace, start polling
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        store: Arc<SessionKeyStore>,
        config: &WargameConfig,
        options: PageOptions<'_>,
        build: impl FnOnce(Arc<SessionKeyStore>, SessionId) -> W,
    ) -> RoleResult<Self> {
        let session = SessionResolver::new(&store).resolve(options.query);
        store.bind_session(session.clone());

        let mut migrator = LegacyMigrator::new(&store);
        if let Some(sink) = options.backup_sink {
            migrator = migrator.with_sink(sink);
        }
        if migrator.migrate_once(&session) {
            info!(%session, "legacy data migrated on page load");
        }

        let mut workspace = build(Arc::clone(&store), session.clone());
        let role = workspace.role();
        if !workspace.load(options.mode)? {
            debug!(%role, %session, "no stored workspace, starting empty");
        }

        let mut page = Self {
            timer: TimerDisplay::new(Arc::clone(&store), &session, config.timer),
            timeline: Arc::new(RwLock::new(workspace.timeline())),
            workspace: Arc::new(Mutex::new(workspace)),
            store,
            session,
            mode: options.mode,
            game_state: None,
            tasks: Vec::new(),
            closed: false,
        };

        if !role.controls_game() {
            page.follow_game_state(config.polling.state(), options.events);
        }
        page.spawn_refresh(config.polling.timeline(), false);
        page.spawn_refresh(config.polling.responses(), true);
        info!(%role, session = %page.session, "role page opened");
        Ok(page)
    }

    fn follow_game_state(&mut self, every: Duration, events: Option<StorageEvents>) {
        let reader = game_state_reader(Arc::clone(&self.store), &self.session);
        if let Some(state) = reader.read() {
            if let Err(e) = self.workspace.lock().follow(&state, self.mode) {
                warn!(error = %e, "could not apply stored game state");
            }
        }

        let workspace = Arc::clone(&self.workspace);
        let timeline = Arc::clone(&self.timeline);
        let mode = self.mode;
        let id = reader.subscribe(move |state: &GameState| {
            let mut ws = workspace.lock();
            match ws.follow(state, mode) {
                Ok(moved) => {
                    if moved {
                        info!(move_number = %state.move_number, "following move change");
                    }
                    *timeline.write() = ws.timeline();
                }
                Err(e) => warn!(error = %e, "could not follow game state"),
            }
        });
        self.tasks.push(reader.spawn_poller(every, events));
        self.game_state = Some((reader, id));
    }

    fn spawn_refresh(&mut self, every: Duration, poll_updates: bool) {
        let workspace = Arc::clone(&self.workspace);
        let timeline = Arc::clone(&self.timeline);
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mut ws = workspace.lock();
                if poll_updates {
                    let fresh = ws.poll_updates();
                    if fresh > 0 {
                        debug!(fresh, "picked up updates from other pages");
                    }
                }
                *timeline.write() = ws.timeline();
            }
        }));
    }

    /// Resolved session
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<SessionKeyStore> {
        &self.store
    }

    /// Exclusive access to the workspace
    ///
    /// Background refreshes wait while the guard is held.
    pub fn workspace(&self) -> MutexGuard<'_, W> {
        self.workspace.lock()
    }

    /// Timeline as of the last refresh
    #[must_use]
    pub fn timeline(&self) -> Vec<TimelineItem> {
        self.timeline.read().clone()
    }

    /// Recompute the timeline now
    pub fn refresh_timeline(&self) -> Vec<TimelineItem> {
        let items = self.workspace.lock().timeline();
        self.timeline.write().clone_from(&items);
        items
    }

    /// Poll the game state now; returns the state when it changed
    pub fn poll_game_state(&self) -> Option<GameState> {
        self.game_state.as_ref().and_then(|(reader, _)| reader.poll())
    }

    /// Current countdown as displayed
    #[must_use]
    pub fn timer(&self) -> TimerReading {
        self.timer.reading()
    }

    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some((reader, id)) = self.game_state.take() {
            reader.unsubscribe(id);
        }
    }

    /// Stop polling and save once
    ///
    /// Further calls do nothing.
    pub fn close(&mut self) -> RoleResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stop();
        let mut ws = self.workspace.lock();
        ws.save()?;
        info!(role = %ws.role(), session = %self.session, "role page closed");
        Ok(())
    }
}

impl<W: Workspace + 'static> Drop for RolePage<W> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(session = %self.session, "role page dropped without close, skipping final save");
        }
        self.stop();
    }
}

impl<W: Workspace + std::fmt::Debug + 'static> std::fmt::Debug for RolePage<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolePage")
            .field("session", &self.session)
            .field("mode", &self.mode)
            .field("tasks", &self.tasks.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilitator::{ActionDraft, Facilitator};
    use crate::notetaker::Notetaker;
    use crate::white_cell::WhiteCell;
    use pretty_assertions::assert_eq;
    use wargame_store::{keys, MemoryBackend, Move, Phase};

    fn store() -> Arc<SessionKeyStore> {
        Arc::new(SessionKeyStore::new(Arc::new(MemoryBackend::new())))
    }

    #[tokio::test]
    async fn open_resolves_session_and_migrates() {
        let store = store();
        store.set_raw("whiteCell_move_1", r#"{"timelineItems":[],"currentPhase":2}"#);
        let config = WargameConfig::default();
        let mut page = RolePage::open(
            Arc::clone(&store),
            &config,
            PageOptions {
                query: Some("?sessionId=ex-7"),
                ..PageOptions::default()
            },
            |store, session| WhiteCell::new(store, session, Move::FIRST, &config),
        )
        .unwrap();

        assert_eq!(page.session().as_str(), "ex-7");
        assert_eq!(store.session().as_str(), "ex-7");
        assert!(store.contains("data_migrated_session_ex-7"));
        assert_eq!(page.workspace().phase(), Phase::AllianceConsultation);
        page.close().unwrap();
    }

    #[tokio::test]
    async fn follower_tracks_published_move() {
        let store = store();
        let config = WargameConfig::default();
        let session = SessionId::new("ex-1");
        store.bind_session(session.clone());
        let mut white = WhiteCell::new(Arc::clone(&store), session.clone(), Move::FIRST, &config);
        white.publish().unwrap();

        let mut page = RolePage::open(
            Arc::clone(&store),
            &config,
            PageOptions {
                query: Some("?sessionId=ex-1"),
                ..PageOptions::default()
            },
            |store, session| Notetaker::new(store, session, Move::FIRST, &config),
        )
        .unwrap();
        assert_eq!(page.workspace().move_number(), Move::FIRST);

        white.change_move(Move::LAST).unwrap();
        assert!(page.poll_game_state().is_some());
        assert_eq!(page.workspace().move_number(), Move::LAST);
        page.close().unwrap();
    }

    #[tokio::test]
    async fn close_flushes_a_final_save() {
        let store = store();
        let config = WargameConfig::default();
        let mut page = RolePage::open(
            Arc::clone(&store),
            &config,
            PageOptions {
                query: Some("?sessionId=ex-2"),
                ..PageOptions::default()
            },
            |store, session| Facilitator::new(store, session, Move::FIRST, &config),
        )
        .unwrap();
        page.workspace()
            .add_action(ActionDraft {
                mechanism: "sanctions".into(),
                sector: "energy".into(),
                targets: vec!["RED".into()],
                exposure: "high".into(),
                goal: "deter".into(),
                outcomes: "fewer exports".into(),
                contingencies: "escalate".into(),
            })
            .unwrap();
        page.close().unwrap();
        page.close().unwrap();

        let key = keys::Record::Actions.key(&SessionId::new("ex-2"), Move::FIRST);
        let saved = store.get_value(&key).unwrap();
        assert_eq!(saved["actions"][0]["goal"], "deter");
    }
}
