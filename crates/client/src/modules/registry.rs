use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use partyline_domain::GameName;

use super::{GameModule, ModuleContext, ModuleError};

pub type ModuleFuture = BoxFuture<'static, Result<Box<dyn GameModule>, ModuleError>>;

/// Builds a module from its context.
pub type ModuleFactory = Arc<dyn Fn(ModuleContext) -> ModuleFuture + Send + Sync>;

/// Game name -> module factory.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: HashMap<GameName, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async factory. A later registration under the same name
    /// replaces the earlier one.
    pub fn register<F, Fut>(&mut self, name: GameName, factory: F)
    where
        F: Fn(ModuleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Box<dyn GameModule>, ModuleError>> + Send + 'static,
    {
        tracing::debug!(game = %name, "Game module registered");
        self.factories
            .insert(name, Arc::new(move |ctx| factory(ctx).boxed()));
    }

    /// Register a module whose construction cannot fail.
    pub fn register_with<F, M>(&mut self, name: GameName, build: F)
    where
        F: Fn(ModuleContext) -> M + Send + Sync + 'static,
        M: GameModule + 'static,
    {
        self.register(name, move |ctx| {
            let module: Box<dyn GameModule> = Box::new(build(ctx));
            async move { Ok(module) }
        });
    }

    pub fn with<F, M>(mut self, name: GameName, build: F) -> Self
    where
        F: Fn(ModuleContext) -> M + Send + Sync + 'static,
        M: GameModule + 'static,
    {
        self.register_with(name, build);
        self
    }

    pub fn get(&self, name: &GameName) -> Option<ModuleFactory> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &GameName) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<GameName> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("games", &self.names())
            .finish()
    }
}
