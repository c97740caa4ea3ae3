use refguard_core::{Component, ComponentHooks, HookError, HookRegistry};

/// Fallback hooks that log every invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceHooks;

impl ComponentHooks for TraceHooks {
    fn on_created(&self, component: &Component) -> Result<(), HookError> {
        tracing::info!(component = %component.type_name, "on_created");
        Ok(())
    }

    fn on_will_destroy(&self, component: &Component) -> Result<(), HookError> {
        tracing::info!(component = %component.type_name, "on_will_destroy");
        Ok(())
    }
}

/// The registry the binary runs with. Without tracing, no component type
/// has hooks.
pub fn registry(trace_hooks: bool) -> HookRegistry {
    let mut registry = HookRegistry::new();
    if trace_hooks {
        registry.set_fallback(TraceHooks);
    }
    registry
}
