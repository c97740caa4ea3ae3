//! Lifecycle hooks for components of template assets.
//!
//! Hosts register a [`ComponentHooks`] implementation per component type.
//! Both hooks default to no-ops, so an implementation only overrides what it
//! cares about, and a component type with no registration is skipped.

use std::collections::HashMap;

use crate::document::{Component, Document, SceneObject};
use crate::store::AssetStore;
use crate::types::AssetPath;

/// Error returned by a hook. Caught and logged by the dispatcher.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Optional callbacks a component type can react to.
pub trait ComponentHooks {
    /// The template owning this component was just imported.
    fn on_created(&self, _component: &Component) -> Result<(), HookError> {
        Ok(())
    }

    /// The template owning this component is about to be removed.
    fn on_will_destroy(&self, _component: &Component) -> Result<(), HookError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created,
    WillDestroy,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::WillDestroy => "will_destroy",
        }
    }
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Hooks that ran and returned `Ok`.
    pub invoked: usize,
    /// Hooks that returned an error.
    pub failed: usize,
    /// Components with no registered hooks.
    pub skipped: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.invoked += other.invoked;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

#[derive(Default)]
pub struct HookRegistry {
    by_type: HashMap<String, Box<dyn ComponentHooks>>,
    fallback: Option<Box<dyn ComponentHooks>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, hooks: impl ComponentHooks + 'static) {
        self.by_type.insert(type_name.into(), Box::new(hooks));
    }

    /// Hooks used for component types without their own registration.
    pub fn set_fallback(&mut self, hooks: impl ComponentHooks + 'static) {
        self.fallback = Some(Box::new(hooks));
    }

    pub fn notify_created(&self, root: &SceneObject) -> DispatchReport {
        self.dispatch(root, LifecycleEvent::Created, |_| true)
    }

    pub fn notify_will_destroy(&self, root: &SceneObject) -> DispatchReport {
        self.dispatch(root, LifecycleEvent::WillDestroy, |_| true)
    }

    /// `on_will_destroy` for every component of `class_name` under `roots`.
    pub fn notify_will_destroy_type(
        &self,
        roots: &[SceneObject],
        class_name: &str,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for root in roots {
            report.merge(self.dispatch(root, LifecycleEvent::WillDestroy, |component| {
                component.type_name == class_name
            }));
        }
        report
    }

    fn hooks_for(&self, type_name: &str) -> Option<&dyn ComponentHooks> {
        self.by_type
            .get(type_name)
            .or(self.fallback.as_ref())
            .map(|hooks| &**hooks)
    }

    fn dispatch(
        &self,
        root: &SceneObject,
        event: LifecycleEvent,
        filter: impl Fn(&Component) -> bool,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        root.for_each_component(&mut |owner, component| {
            if !filter(component) {
                return;
            }
            let Some(hooks) = self.hooks_for(&component.type_name) else {
                report.skipped += 1;
                return;
            };

            let result = match event {
                LifecycleEvent::Created => hooks.on_created(component),
                LifecycleEvent::WillDestroy => hooks.on_will_destroy(component),
            };
            match result {
                Ok(()) => report.invoked += 1,
                Err(e) => {
                    tracing::warn!(
                        event = event.as_str(),
                        object = %owner.name,
                        component = %component.type_name,
                        error = %e,
                        "Lifecycle hook failed"
                    );
                    report.failed += 1;
                }
            }
        });

        report
    }
}

/// Dispatch `on_created` for every template among freshly imported paths.
pub fn on_assets_imported<S: AssetStore + ?Sized>(
    store: &S,
    registry: &HookRegistry,
    imported: &[AssetPath],
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for path in imported {
        match store.load_document(path) {
            Ok(Document::Template(template)) => {
                report.merge(registry.notify_created(&template.root));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Imported asset could not be loaded");
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::document::TemplateDocument;
    use crate::store::MemoryStore;
    use crate::types::{AssetId, AssetKind};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl ComponentHooks for Recorder {
        fn on_created(&self, component: &Component) -> Result<(), HookError> {
            self.calls
                .borrow_mut()
                .push(format!("created:{}", component.type_name));
            Ok(())
        }

        fn on_will_destroy(&self, component: &Component) -> Result<(), HookError> {
            self.calls
                .borrow_mut()
                .push(format!("destroy:{}", component.type_name));
            if self.fail {
                Err(HookError("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Implements neither hook.
    struct Inert;
    impl ComponentHooks for Inert {}

    fn tree() -> SceneObject {
        SceneObject::new("root")
            .with_component(Component::new("Spawner"))
            .with_component(Component::new("Renderer"))
            .with_child(SceneObject::new("child").with_component(Component::new("Spawner")))
    }

    #[test]
    fn dispatches_to_each_component_once() {
        let recorder = Recorder::default();
        let mut registry = HookRegistry::new();
        registry.register("Spawner", recorder.clone());

        let report = registry.notify_will_destroy(&tree());
        assert_eq!(report.invoked, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            *recorder.calls.borrow(),
            vec!["destroy:Spawner".to_string(), "destroy:Spawner".to_string()]
        );
    }

    #[test]
    fn failing_hook_does_not_stop_siblings() {
        let failing = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let healthy = Recorder::default();
        let mut registry = HookRegistry::new();
        registry.register("Spawner", failing.clone());
        registry.register("Renderer", healthy.clone());

        let report = registry.notify_will_destroy(&tree());
        assert_eq!(report.failed, 2);
        assert_eq!(report.invoked, 1);
        assert_eq!(healthy.calls.borrow().len(), 1);
    }

    #[test]
    fn default_hooks_are_no_ops() {
        let mut registry = HookRegistry::new();
        registry.set_fallback(Inert);

        let report = registry.notify_created(&tree());
        assert_eq!(report.invoked, 3);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn type_filtered_dispatch() {
        let recorder = Recorder::default();
        let mut registry = HookRegistry::new();
        registry.set_fallback(recorder.clone());

        let report = registry.notify_will_destroy_type(&[tree(), tree()], "Renderer");
        assert_eq!(report.invoked, 2);
        assert!(recorder.calls.borrow().iter().all(|c| c == "destroy:Renderer"));
    }

    #[test]
    fn import_notifies_templates_only() {
        let recorder = Recorder::default();
        let mut registry = HookRegistry::new();
        registry.set_fallback(recorder.clone());

        let mut store = MemoryStore::new();
        store.insert_document(
            "Prefabs/spawner.template",
            AssetId::new("tpl"),
            AssetKind::Instance,
            Document::Template(TemplateDocument { root: tree() }),
        );

        let report = on_assets_imported(
            &store,
            &registry,
            &[
                AssetPath::from("Prefabs/spawner.template"),
                AssetPath::from("Prefabs/missing.template"),
            ],
        );
        assert_eq!(report.invoked, 3);
        assert!(recorder
            .calls
            .borrow()
            .iter()
            .all(|c| c.starts_with("created:")));
    }
}
