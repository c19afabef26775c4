use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::actions::DiagnosticsSink;

pub type CommandArgs = Vec<String>;

type CommandHandler = Arc<dyn Fn(CommandArgs) -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct Subscription {
    name: String,
    description: String,
    serializable: bool,
    handler: CommandHandler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescription {
    pub name: String,
    pub description: String,
}

/// Outcome of a `publish` call. An unknown name is a signal, never an error:
/// the caller decides how to hint at the help listing.
pub enum Dispatch {
    Spawned(JoinHandle<()>),
    Unknown,
}

impl Dispatch {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Dispatch::Unknown)
    }
}

/// Runtime registry of interactive line commands. Sub-features subscribe and
/// unsubscribe as project state changes; the whole set is rebuilt on a mode
/// change. Cloning shares the registry.
#[derive(Clone)]
pub struct CommandBus {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    // Dispatch gates outlive replacement and removal so a re-subscribed
    // command still queues behind an in-flight invocation of its old handler.
    gates: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CommandBus {
    pub fn new(diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            gates: Arc::new(Mutex::new(HashMap::new())),
            diagnostics,
        }
    }

    /// Register `name`, replacing any prior handler in place (the listing
    /// position of a replaced command does not move). Repeated invocations of
    /// the command are queued behind each other.
    pub fn subscribe<F>(&self, name: &str, description: &str, handler: F)
    where
        F: Fn(CommandArgs) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.subscribe_with(name, description, true, handler);
    }

    pub fn subscribe_with<F>(&self, name: &str, description: &str, serializable: bool, handler: F)
    where
        F: Fn(CommandArgs) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let subscription = Subscription {
            name: name.to_string(),
            description: description.to_string(),
            serializable,
            handler: Arc::new(handler),
        };
        let mut subscriptions = lock(&self.subscriptions);
        match subscriptions.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = subscription,
            None => subscriptions.push(subscription),
        }
    }

    pub fn unsubscribe(&self, name: &str) {
        lock(&self.subscriptions).retain(|s| s.name != name);
    }

    /// Drop every subscription (mode change). Dispatch gates are kept so
    /// in-flight handlers still serialize against re-registered commands.
    pub fn clear(&self) {
        lock(&self.subscriptions).clear();
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        lock(&self.subscriptions).iter().any(|s| s.name == name)
    }

    /// `{name, description}` pairs for commands with a non-empty description,
    /// in subscription order. Used to render the help/tip listing.
    pub fn descriptions(&self) -> Vec<CommandDescription> {
        lock(&self.subscriptions)
            .iter()
            .filter(|s| !s.description.is_empty())
            .map(|s| CommandDescription {
                name: s.name.clone(),
                description: s.description.clone(),
            })
            .collect()
    }

    /// Dispatch `name` with `args` on the session runtime. Distinct command
    /// names always run concurrently; repeated invocations of the same
    /// serializable command are queued behind the in-flight one. Handler
    /// errors go to the diagnostics sink, never out of the dispatch loop.
    pub fn publish(&self, name: &str, args: CommandArgs) -> Dispatch {
        let entry = {
            let subscriptions = lock(&self.subscriptions);
            subscriptions
                .iter()
                .find(|s| s.name == name)
                .map(|s| (s.handler.clone(), s.serializable))
        };
        let Some((handler, serializable)) = entry else {
            tracing::warn!("unknown command `{name}`");
            return Dispatch::Unknown;
        };

        let gate = self.gate_for(name);
        let diagnostics = self.diagnostics.clone();
        let label = name.to_string();
        let handle = tokio::spawn(async move {
            let outcome = if serializable {
                let _slot = gate.lock().await;
                handler(args).await
            } else {
                handler(args).await
            };
            if let Err(error) = outcome {
                diagnostics.report(&format!("command `{label}`"), &error);
            }
        });
        Dispatch::Spawned(handle)
    }

    fn gate_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.gates)
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}
