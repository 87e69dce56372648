use crate::class_space::ClassSpaceResolver;
use crate::config::ExtenderSection;
use crate::core::events::EventDispatcher;
use crate::core::runtime_slot::same_runtime;
use crate::core::state::LifecycleState;
use crate::core::web_application::{ContextReleaseListener, DeploymentContext, WebApplication};
use crate::domain::model::{ModuleId, ModuleRef, WebEvent};
use crate::domain::ports::{Scheduler, WebRuntime};
use crate::utils::error::Result;
use crate::utils::validation::validate_context_path;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};

struct ExtenderInner {
    apps: Mutex<BTreeMap<ModuleId, Arc<WebApplication>>>,
    runtime: Mutex<Option<Arc<dyn WebRuntime>>>,
    context: DeploymentContext,
    requeue_on_context_release: bool,
}

/// 管理所有部署單元, 並把模組與 runtime 的生命週期事件轉給它們
#[derive(Clone)]
pub struct WarExtender {
    inner: Arc<ExtenderInner>,
}

impl WarExtender {
    pub fn new(
        resolver: Arc<ClassSpaceResolver>,
        scheduler: Arc<dyn Scheduler>,
        settings: &ExtenderSection,
    ) -> Self {
        let events = EventDispatcher::new(settings.event_capacity);
        let gate_timeout = settings.gate_timeout();
        let requeue_on_context_release = settings.requeue_on_context_release;

        let inner = Arc::new_cyclic(|weak: &Weak<ExtenderInner>| {
            let weak = weak.clone();
            let listener: ContextReleaseListener =
                Arc::new(move |module: &ModuleRef, context_path: &str| {
                    if let Some(inner) = weak.upgrade() {
                        inner.requeue(module, context_path);
                    }
                });
            ExtenderInner {
                apps: Mutex::new(BTreeMap::new()),
                runtime: Mutex::new(None),
                context: DeploymentContext::new(resolver, scheduler, events, gate_timeout)
                    .with_release_listener(listener),
                requeue_on_context_release,
            }
        });
        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WebEvent> {
        self.inner.context.events.subscribe()
    }

    /// 模組啟動: 一律建立新的部署單元
    pub fn module_started(
        &self,
        module: ModuleRef,
        context_path: &str,
    ) -> Result<Arc<WebApplication>> {
        validate_context_path("context_path", context_path)?;

        let app = WebApplication::new(module.clone(), context_path, self.inner.context.clone());
        let (previous, runtime) = {
            let mut apps = self.inner.apps.lock();
            let runtime = self.inner.runtime.lock().clone();
            (apps.insert(module.id, Arc::clone(&app)), runtime)
        };
        if let Some(previous) = previous {
            debug!("Replacing stale unit {}", previous);
            previous.stop();
        }
        if let Some(runtime) = runtime {
            app.runtime_available(runtime);
        }
        app.start();
        Ok(app)
    }

    /// 模組停止: 停止並丟棄它的部署單元
    pub fn module_stopped(&self, module: &ModuleRef) {
        let app = self.inner.apps.lock().remove(&module.id);
        match app {
            Some(app) => app.stop(),
            None => debug!("No web application for module {}", module),
        }
    }

    pub fn runtime_added(&self, runtime: Arc<dyn WebRuntime>) {
        info!("Web runtime {} added", runtime.name());
        *self.inner.runtime.lock() = Some(Arc::clone(&runtime));
        for app in self.applications() {
            app.runtime_available(Arc::clone(&runtime));
        }
    }

    pub fn runtime_removed(&self, runtime: &Arc<dyn WebRuntime>) {
        info!("Web runtime {} removed", runtime.name());
        {
            let mut current = self.inner.runtime.lock();
            if current.as_ref().is_some_and(|c| same_runtime(c, runtime)) {
                *current = None;
            }
        }
        for app in self.applications() {
            app.runtime_lost(runtime);
        }
    }

    pub fn application(&self, id: ModuleId) -> Option<Arc<WebApplication>> {
        self.inner.apps.lock().get(&id).cloned()
    }

    /// 依單元 id 排序
    pub fn applications(&self) -> Vec<Arc<WebApplication>> {
        self.inner.apps.lock().values().cloned().collect()
    }

    /// 依 id 反向停止所有單元
    pub fn shutdown(&self) {
        let apps: Vec<_> = {
            let mut apps = self.inner.apps.lock();
            std::mem::take(&mut *apps).into_values().rev().collect()
        };
        info!("Shutting down {} web application(s)", apps.len());
        for app in apps {
            app.stop();
        }
    }
}

impl ExtenderInner {
    /// 把 context path 交給等待中 id 最小的單元
    fn requeue(&self, released_by: &ModuleRef, context_path: &str) {
        if !self.requeue_on_context_release {
            return;
        }
        let candidate = self
            .apps
            .lock()
            .values()
            .find(|app| {
                app.module().id != released_by.id
                    && app.context_path() == context_path
                    && app.state() == LifecycleState::WaitingForContextPath
            })
            .cloned();
        if let Some(app) = candidate {
            info!(
                "Context path {} released by {}, requeueing {}",
                context_path, released_by, app
            );
            app.retry_context_allocation();
        }
    }
}
