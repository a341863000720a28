//! Game Module Loader: at most one active module, serialized transitions.
//!
//! `Idle -> Loading -> Active -> Unloading -> Idle | Loading`
//!
//! Construction, `start` and `end` run on spawned tasks and report back as
//! [`LoaderEvent`]s tagged with a generation; the owner feeds them to
//! [`ModuleLoader::on_event`]. Requests arriving mid-transition are
//! coalesced into a single `next` target, last request wins.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use partyline_domain::{GameName, Player};

use super::registry::{ModuleFactory, ModuleRegistry};
use super::{GameModule, ModuleContext, ModuleError, ModuleEvent, ModuleMessage};

/// Where module CSS goes while a module is active.
#[cfg_attr(test, mockall::automock)]
pub trait StylesheetHost: Send + Sync {
    fn attach(&self, game: &GameName, stylesheet: &str);
    fn detach(&self, game: &GameName);
}

/// Headless stylesheet host: records attach/detach in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStylesheets;

impl StylesheetHost for LogStylesheets {
    fn attach(&self, game: &GameName, stylesheet: &str) {
        tracing::debug!(game = %game, bytes = stylesheet.len(), "Stylesheet attached");
    }

    fn detach(&self, game: &GameName) {
        tracing::debug!(game = %game, "Stylesheet detached");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderPhase {
    Idle,
    Loading(GameName),
    Active(GameName),
    Unloading(GameName),
}

/// What a settled transition means for the session.
#[derive(Debug)]
pub enum LoaderOutcome {
    Activated(GameName),
    /// Resolution, construction or start failed; the loader is idle.
    Failed { name: GameName, error: ModuleError },
    /// A previously active module finished `end`.
    Unloaded(GameName),
}

/// Completion of a background load or end, for the owning actor's inbox.
pub struct LoaderEvent {
    generation: u64,
    kind: EventKind,
}

enum EventKind {
    Loaded {
        name: GameName,
        result: Result<LoadedModule, ModuleError>,
    },
    Ended,
}

struct LoadedModule {
    module: Box<dyn GameModule>,
    lifetime: CancellationToken,
}

enum State {
    Idle,
    Loading {
        name: GameName,
        generation: u64,
    },
    Active {
        name: GameName,
        generation: u64,
        module: Box<dyn GameModule>,
        lifetime: CancellationToken,
        stylesheet: bool,
    },
    Unloading {
        name: GameName,
        generation: u64,
        stylesheet: bool,
        /// False when the module was discarded straight out of `Loading`.
        was_active: bool,
    },
}

enum Next {
    Load(GameName),
    Unload,
}

pub struct ModuleLoader {
    registry: ModuleRegistry,
    template: ModuleContext,
    stylesheets: Arc<dyn StylesheetHost>,
    events: mpsc::UnboundedSender<LoaderEvent>,
    state: State,
    next: Option<Next>,
    generation: u64,
    /// Events that arrived while loading, replayed on activation.
    backlog: Vec<ModuleEvent>,
}

impl ModuleLoader {
    pub fn new(
        registry: ModuleRegistry,
        template: ModuleContext,
        stylesheets: Arc<dyn StylesheetHost>,
    ) -> (Self, mpsc::UnboundedReceiver<LoaderEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let loader = Self {
            registry,
            template,
            stylesheets,
            events,
            state: State::Idle,
            next: None,
            generation: 0,
            backlog: Vec::new(),
        };
        (loader, rx)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn phase(&self) -> LoaderPhase {
        match &self.state {
            State::Idle => LoaderPhase::Idle,
            State::Loading { name, .. } => LoaderPhase::Loading(name.clone()),
            State::Active { name, .. } => LoaderPhase::Active(name.clone()),
            State::Unloading { name, .. } => LoaderPhase::Unloading(name.clone()),
        }
    }

    pub fn active(&self) -> Option<&GameName> {
        match &self.state {
            State::Active { name, .. } => Some(name),
            _ => None,
        }
    }

    /// No transition in flight.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, State::Idle | State::Active { .. })
    }

    fn active_generation(&self) -> Option<u64> {
        match &self.state {
            State::Active { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    /// Generation of the module allowed to act on the session: the active
    /// one, or the one loading unless a later request already replaced it.
    pub fn live_generation(&self) -> Option<u64> {
        match &self.state {
            State::Loading { name, generation } if !self.is_superseded(name) => Some(*generation),
            State::Active { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    /// Whether a module command may still take effect. A module that is
    /// ending, or whose load was replaced, may only clear what it rendered.
    pub fn admits(&self, message: &ModuleMessage) -> bool {
        if self.live_generation() == Some(message.generation) {
            return true;
        }
        let ending = match &self.state {
            State::Loading { generation, .. } | State::Unloading { generation, .. } => {
                *generation == message.generation
            }
            State::Idle | State::Active { .. } => false,
        };
        ending && message.command.is_teardown()
    }

    fn is_superseded(&self, name: &GameName) -> bool {
        match &self.next {
            Some(Next::Load(next)) => next != name,
            Some(Next::Unload) => true,
            None => false,
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Load `name`, ending the active module first. Loading the active game
    /// restarts it.
    pub fn load(&mut self, name: GameName, players: &[Player]) {
        match self.state {
            State::Idle => self.begin_load(name, players),
            State::Active { .. } => {
                self.next = Some(Next::Load(name));
                self.begin_unload();
            }
            State::Loading { .. } | State::Unloading { .. } => {
                tracing::debug!(game = %name, "Transition in flight, load request coalesced");
                self.next = Some(Next::Load(name));
            }
        }
    }

    pub fn unload(&mut self) {
        match self.state {
            State::Idle => self.next = None,
            State::Active { .. } => {
                self.next = None;
                self.begin_unload();
            }
            State::Loading { .. } | State::Unloading { .. } => {
                tracing::debug!("Transition in flight, unload request coalesced");
                self.next = Some(Next::Unload);
            }
        }
    }

    /// Forward a session event to the active module. Events arriving while
    /// a module loads are held until it is active.
    pub async fn dispatch(&mut self, event: ModuleEvent) {
        match &mut self.state {
            State::Active { module, .. } => module.on_event(event).await,
            State::Loading { .. } => self.backlog.push(event),
            State::Idle | State::Unloading { .. } => {
                tracing::trace!(?event, "No active module, event dropped");
            }
        }
    }

    /// Deliver a timer scheduled by the module of `generation`.
    pub async fn timer(&mut self, generation: u64, tag: String) {
        if self.active_generation() != Some(generation) {
            tracing::trace!(generation, tag = %tag, "Timer of a finished module ignored");
            return;
        }
        self.dispatch(ModuleEvent::Timer(tag)).await;
    }

    /// End the active module inline. Used when the session shuts down.
    pub async fn shutdown(&mut self) {
        self.next = None;
        if let State::Active {
            name,
            mut module,
            lifetime,
            stylesheet,
            ..
        } = std::mem::replace(&mut self.state, State::Idle)
        {
            lifetime.cancel();
            module.end().await;
            if stylesheet {
                self.stylesheets.detach(&name);
            }
            tracing::info!(game = %name, "Game module ended on shutdown");
        }
    }

    // =========================================================================
    // Completions
    // =========================================================================

    pub async fn on_event(&mut self, event: LoaderEvent, players: &[Player]) -> Vec<LoaderOutcome> {
        let mut outcomes = Vec::new();
        match event.kind {
            EventKind::Loaded { name, result } => {
                self.loaded(event.generation, name, result, players, &mut outcomes)
                    .await
            }
            EventKind::Ended => self.ended(event.generation, players, &mut outcomes),
        }
        outcomes
    }

    async fn loaded(
        &mut self,
        generation: u64,
        name: GameName,
        result: Result<LoadedModule, ModuleError>,
        players: &[Player],
        outcomes: &mut Vec<LoaderOutcome>,
    ) {
        let current = matches!(&self.state, State::Loading { generation: g, .. } if *g == generation);
        if !current {
            tracing::warn!(game = %name, generation, "Stale module load completed");
            if let Ok(loaded) = result {
                self.spawn_end(generation, loaded);
            }
            return;
        }

        let loaded = match result {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::warn!(game = %name, error = %error, "Game module failed to load");
                self.state = State::Idle;
                self.backlog.clear();
                outcomes.push(LoaderOutcome::Failed { name, error });
                self.run_next(players);
                return;
            }
        };

        if self.is_superseded(&name) {
            tracing::debug!(game = %name, "Loaded module superseded, ending it");
            self.backlog.clear();
            self.spawn_end(generation, loaded);
            self.state = State::Unloading {
                name,
                generation,
                stylesheet: false,
                was_active: false,
            };
            return;
        }
        self.next = None;

        let LoadedModule {
            mut module,
            lifetime,
        } = loaded;
        let stylesheet = match module.stylesheet() {
            Some(css) => {
                self.stylesheets.attach(&name, css);
                true
            }
            None => false,
        };
        for event in std::mem::take(&mut self.backlog) {
            module.on_event(event).await;
        }

        tracing::info!(game = %name, generation, "Game module active");
        self.state = State::Active {
            name: name.clone(),
            generation,
            module,
            lifetime,
            stylesheet,
        };
        outcomes.push(LoaderOutcome::Activated(name));
    }

    fn ended(&mut self, generation: u64, players: &[Player], outcomes: &mut Vec<LoaderOutcome>) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Unloading {
                name,
                generation: g,
                stylesheet,
                was_active,
            } if g == generation => {
                if stylesheet {
                    self.stylesheets.detach(&name);
                }
                tracing::info!(game = %name, generation, "Game module ended");
                if was_active {
                    outcomes.push(LoaderOutcome::Unloaded(name));
                }
                self.run_next(players);
            }
            other => {
                self.state = other;
                tracing::trace!(generation, "Stale module end ignored");
            }
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn run_next(&mut self, players: &[Player]) {
        if let Some(Next::Load(name)) = self.next.take() {
            self.begin_load(name, players);
        }
    }

    fn begin_load(&mut self, name: GameName, players: &[Player]) {
        self.generation += 1;
        let generation = self.generation;
        self.backlog.clear();

        let factory = self.registry.get(&name);
        let ctx = self.template.for_module(name.clone(), generation);
        let players = players.to_vec();
        let events = self.events.clone();
        let task_name = name.clone();
        tokio::spawn(async move {
            let result = build_and_start(factory, &task_name, ctx, &players).await;
            let _ = events.send(LoaderEvent {
                generation,
                kind: EventKind::Loaded {
                    name: task_name,
                    result,
                },
            });
        });

        tracing::info!(game = %name, generation, "Loading game module");
        self.state = State::Loading { name, generation };
    }

    fn begin_unload(&mut self) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Active {
                name,
                generation,
                module,
                lifetime,
                stylesheet,
            } => {
                tracing::info!(game = %name, generation, "Ending game module");
                self.spawn_end(generation, LoadedModule { module, lifetime });
                self.state = State::Unloading {
                    name,
                    generation,
                    stylesheet,
                    was_active: true,
                };
            }
            other => self.state = other,
        }
    }

    fn spawn_end(&self, generation: u64, loaded: LoadedModule) {
        let LoadedModule {
            mut module,
            lifetime,
        } = loaded;
        lifetime.cancel();
        let events = self.events.clone();
        tokio::spawn(async move {
            module.end().await;
            drop(module);
            let _ = events.send(LoaderEvent {
                generation,
                kind: EventKind::Ended,
            });
        });
    }
}

async fn build_and_start(
    factory: Option<ModuleFactory>,
    name: &GameName,
    ctx: ModuleContext,
    players: &[Player],
) -> Result<LoadedModule, ModuleError> {
    let factory = factory.ok_or_else(|| ModuleError::Unknown(name.clone()))?;
    let lifetime = ctx.lifetime().clone();
    let mut module = factory(ctx).await?;

    if let Err(e) = module.start(players).await {
        lifetime.cancel();
        module.end().await;
        return Err(e);
    }
    Ok(LoadedModule { module, lifetime })
}
