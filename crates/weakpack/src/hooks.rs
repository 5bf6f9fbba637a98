//! Build lifecycle hooks
//!
//! Two primitives cover every extension point: [`SyncHook`] runs its
//! callbacks in registration order and returns once all of them have run;
//! [`AsyncSeriesHook`] awaits each callback to completion before starting the
//! next one. A failing callback is fatal in both cases and later callbacks do
//! not run.

use std::fmt;

use futures::future::BoxFuture;
use log::trace;

use crate::{
    assets::AssetCollection,
    config::BundleOptions,
    error::{BundleError, Result},
    graph::DependencyGraph,
    orchestrator::BuildSummary,
};

type SyncCallback<T> = Box<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

type AsyncCallback<T> =
    Box<dyn for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

/// Synchronous multicast hook
pub struct SyncHook<T> {
    name: &'static str,
    taps: Vec<(String, SyncCallback<T>)>,
}

impl<T> SyncHook<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `callback` on behalf of `plugin`
    ///
    /// Registering the same callback twice makes it run twice.
    pub fn tap<F>(&mut self, plugin: impl Into<String>, callback: F)
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.taps.push((plugin.into(), Box::new(callback)));
    }

    /// Run every callback in registration order, stopping at the first error
    pub fn call(&self, argument: &T) -> Result<()> {
        for (plugin, callback) in &self.taps {
            trace!("Calling {} hook of {plugin}", self.name);
            callback(argument).map_err(|source| BundleError::Hook {
                hook: self.name,
                plugin: plugin.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

impl<T> fmt::Debug for SyncHook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHook")
            .field("name", &self.name)
            .field("taps", &self.taps.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .finish()
    }
}

/// Asynchronous series hook carrying a mutable argument
pub struct AsyncSeriesHook<T> {
    name: &'static str,
    taps: Vec<(String, AsyncCallback<T>)>,
}

impl<T: Send> AsyncSeriesHook<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            taps: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register an asynchronous `callback` on behalf of `plugin`
    ///
    /// The callback signals completion by resolving its future: `Ok(())` lets
    /// the next callback start, an error aborts the series.
    pub fn tap_async<F>(&mut self, plugin: impl Into<String>, callback: F)
    where
        F: for<'a> Fn(&'a mut T) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.taps.push((plugin.into(), Box::new(callback)));
    }

    /// Run callbacks one at a time in registration order
    pub async fn call_async(&self, argument: &mut T) -> Result<()> {
        for (plugin, callback) in &self.taps {
            trace!("Calling {} hook of {plugin}", self.name);
            callback(argument)
                .await
                .map_err(|source| BundleError::Hook {
                    hook: self.name,
                    plugin: plugin.clone(),
                    source,
                })?;
            // Give the scheduler a turn between callbacks
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

impl<T> fmt::Debug for AsyncSeriesHook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSeriesHook")
            .field("name", &self.name)
            .field("taps", &self.taps.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .finish()
    }
}

/// The fixed set of extension points, fired once each per build in this
/// order
#[derive(Debug)]
pub struct Hooks {
    /// Before the dependency graph is built
    pub compile: SyncHook<BundleOptions>,
    /// After the dependency graph is complete
    pub after_compile: SyncHook<DependencyGraph>,
    /// With the mutable asset collection, before anything is written
    pub emit: AsyncSeriesHook<AssetCollection>,
    /// After every asset has been written
    pub done: SyncHook<BuildSummary>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            compile: SyncHook::new("compile"),
            after_compile: SyncHook::new("afterCompile"),
            emit: AsyncSeriesHook::new("emit"),
            done: SyncHook::new("done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, bail};
    use futures::FutureExt;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_sync_callbacks_run_in_registration_order() -> Result<()> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut hook = SyncHook::<u32>::new("compile");
        for name in ["f1", "f2", "f1"] {
            let calls = Arc::clone(&calls);
            hook.tap(name, move |value: &u32| {
                calls.lock().expect("lock").push(format!("{name}:{value}"));
                Ok(())
            });
        }

        hook.call(&7)?;
        assert_eq!(hook.len(), 3);
        assert_eq!(*calls.lock().expect("lock"), vec!["f1:7", "f2:7", "f1:7"]);
        Ok(())
    }

    #[test]
    fn test_sync_failure_stops_later_callbacks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut hook = SyncHook::<()>::new("afterCompile");
        let first = Arc::clone(&calls);
        hook.tap("ok", move |()| {
            first.lock().expect("lock").push("ok");
            Ok(())
        });
        hook.tap("broken", |()| bail!("boom"));
        let last = Arc::clone(&calls);
        hook.tap("never", move |()| {
            last.lock().expect("lock").push("never");
            Ok(())
        });

        let err = hook.call(&()).expect_err("second callback fails");
        assert_eq!(err.kind(), "HookError");
        assert_eq!(err.to_string(), "plugin `broken` failed during `afterCompile` hook");
        assert_eq!(*calls.lock().expect("lock"), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_async_series_completes_each_callback_before_the_next() -> Result<()> {
        let mut hook = AsyncSeriesHook::<Vec<String>>::new("emit");
        hook.tap_async("g1", |log: &mut Vec<String>| {
            async move {
                log.push("g1:start".to_owned());
                tokio::task::yield_now().await;
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                log.push("g1:end".to_owned());
                Ok(())
            }
            .boxed()
        });
        hook.tap_async("g2", |log: &mut Vec<String>| {
            async move {
                log.push("g2:start".to_owned());
                Ok(())
            }
            .boxed()
        });

        let mut log = Vec::new();
        hook.call_async(&mut log).await?;
        assert_eq!(log, vec!["g1:start", "g1:end", "g2:start"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_async_failure_signal_aborts_the_series() {
        let mut hook = AsyncSeriesHook::<Vec<&'static str>>::new("emit");
        hook.tap_async("fails", |_: &mut Vec<&'static str>| {
            async move { Err(anyhow!("disk full")) }.boxed()
        });
        hook.tap_async("skipped", |log: &mut Vec<&'static str>| {
            async move {
                log.push("skipped ran");
                Ok(())
            }
            .boxed()
        });

        let mut log = Vec::new();
        let err = hook.call_async(&mut log).await.expect_err("first callback fails");
        assert_eq!(err.kind(), "HookError");
        assert!(err.to_string().contains("`fails`"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_default_hooks_are_named_after_lifecycle_phases() {
        let hooks = Hooks::default();
        assert_eq!(hooks.compile.name(), "compile");
        assert_eq!(hooks.after_compile.name(), "afterCompile");
        assert_eq!(hooks.emit.name(), "emit");
        assert_eq!(hooks.done.name(), "done");
        assert!(hooks.emit.is_empty());
    }
}
