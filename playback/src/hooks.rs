use std::fmt;

use tas_host_integrations::Log;

pub type RunHook = Box<dyn FnMut() + Send>;

/// Callbacks fired when a run starts or ends, keyed by name so a subsystem can
/// replace its own hook.
#[derive(Default)]
pub struct RunHooks {
    on_enable: Vec<(String, RunHook)>,
    on_disable: Vec<(String, RunHook)>,
}

fn upsert(hooks: &mut Vec<(String, RunHook)>, name: String, hook: RunHook) {
    match hooks.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, slot)) => *slot = hook,
        None => hooks.push((name, hook)),
    }
}

impl RunHooks {
    pub fn on_enable<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        upsert(&mut self.on_enable, name.into(), Box::new(hook));
    }

    pub fn on_disable<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        upsert(&mut self.on_disable, name.into(), Box::new(hook));
    }

    /// Drops every hook registered under `name`.
    pub fn remove(&mut self, name: &str) {
        self.on_enable.retain(|(existing, _)| existing != name);
        self.on_disable.retain(|(existing, _)| existing != name);
    }

    pub(crate) fn invoke_enable(&mut self) {
        for (name, hook) in &mut self.on_enable {
            tracing::trace!(target: Log::Playback, name = name.as_str(), "Running enable hook");
            hook();
        }
    }

    pub(crate) fn invoke_disable(&mut self) {
        for (name, hook) in &mut self.on_disable {
            tracing::trace!(target: Log::Playback, name = name.as_str(), "Running disable hook");
            hook();
        }
    }
}

impl fmt::Debug for RunHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |hooks: &[(String, RunHook)]| hooks.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>();

        f.debug_struct("RunHooks")
            .field("on_enable", &names(&self.on_enable))
            .field("on_disable", &names(&self.on_disable))
            .finish()
    }
}
