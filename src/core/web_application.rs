use crate::class_space::{ClassSpaceResolver, ResolvedClassSpace};
use crate::core::events::EventDispatcher;
use crate::core::gate::CompletionGate;
use crate::core::runtime_slot::{same_runtime, RuntimeSlot};
use crate::core::state::{AtomicState, LifecycleState};
use crate::domain::model::{ModuleRef, WebEvent, WebEventPhase};
use crate::domain::ports::{Scheduler, WebRuntime};
use crate::utils::error::{ExtenderError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use LifecycleState::*;

/// context path 被釋放時的回呼 (單元, 路徑)
pub type ContextReleaseListener = Arc<dyn Fn(&ModuleRef, &str) + Send + Sync>;

/// runtime 消失時最多重新檢查狀態的次數
const RUNTIME_LOSS_ROUNDS: usize = 4;

/// 保留的狀態轉換筆數, 超過時丟棄最舊的
const HISTORY_LIMIT: usize = 256;

/// 所有部署單元共用的協作者
#[derive(Clone)]
pub struct DeploymentContext {
    pub resolver: Arc<ClassSpaceResolver>,
    pub scheduler: Arc<dyn Scheduler>,
    pub events: EventDispatcher,
    pub gate_timeout: Duration,
    pub on_context_released: Option<ContextReleaseListener>,
}

impl DeploymentContext {
    pub fn new(
        resolver: Arc<ClassSpaceResolver>,
        scheduler: Arc<dyn Scheduler>,
        events: EventDispatcher,
        gate_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            scheduler,
            events,
            gate_timeout,
            on_context_released: None,
        }
    }

    pub fn with_release_listener(mut self, listener: ContextReleaseListener) -> Self {
        self.on_context_released = Some(listener);
        self
    }
}

/// 排入 worker pool 的下一個階段; 帶著該階段結束時要釋放的 gate
enum Step {
    Configure,
    Allocate(CompletionGate),
    Register(CompletionGate),
}

impl Step {
    fn state(&self) -> LifecycleState {
        match self {
            Step::Configure => Configuring,
            Step::Allocate(_) => AllocatingContext,
            Step::Register(_) => Deploying,
        }
    }

    fn gate(&self) -> Option<&CompletionGate> {
        match self {
            Step::Configure => None,
            Step::Allocate(gate) | Step::Register(gate) => Some(gate),
        }
    }
}

/// 目前這次嘗試的 gate
#[derive(Default)]
struct Attempt {
    allocating: Option<CompletionGate>,
    deploying: Option<CompletionGate>,
}

/// 已取得、需在停止時歸還的資源, 連同取得它的 runtime
#[derive(Default)]
struct HeldResources {
    allocated_on: Option<Arc<dyn WebRuntime>>,
    registered_with: Option<Arc<dyn WebRuntime>>,
}

/// 一個部署單元; 模組重新啟動時會建立新的實例, 狀態不會沿用
pub struct WebApplication {
    module: ModuleRef,
    context_path: String,
    context: DeploymentContext,
    state: AtomicState,
    runtime: RuntimeSlot,
    attempt: Mutex<Attempt>,
    resources: Mutex<HeldResources>,
    model: Mutex<Option<Arc<ResolvedClassSpace>>>,
    waiting_notified: AtomicBool,
    history: Mutex<VecDeque<(LifecycleState, LifecycleState)>>,
}

impl WebApplication {
    pub fn new(
        module: ModuleRef,
        context_path: impl Into<String>,
        context: DeploymentContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            module,
            context_path: context_path.into(),
            context,
            state: AtomicState::new(Unconfigured),
            runtime: RuntimeSlot::new(),
            attempt: Mutex::new(Attempt::default()),
            resources: Mutex::new(HeldResources::default()),
            model: Mutex::new(None),
            waiting_notified: AtomicBool::new(false),
            history: Mutex::new(VecDeque::new()),
        })
    }

    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn state(&self) -> LifecycleState {
        self.state.load()
    }

    /// 已解析的 class space; 設定完成前為 None
    pub fn model(&self) -> Option<Arc<ResolvedClassSpace>> {
        self.model.lock().clone()
    }

    /// 最近成功的狀態轉換, 依發生順序; 僅供診斷, 最多保留 256 筆
    pub fn transitions(&self) -> Vec<(LifecycleState, LifecycleState)> {
        self.history.lock().iter().copied().collect()
    }

    pub fn start(self: &Arc<Self>) {
        if !self.transition(Unconfigured, Configuring) {
            warn!("{} was already started (state {})", self, self.state());
            return;
        }
        info!("🚀 Deploying {}", self);
        self.emit(WebEventPhase::Deploying);
        self.schedule(Step::Configure);
    }

    /// 停止單元; 進行中的配置或註冊會先等到完成再回收資源
    pub fn stop(&self) {
        let (observed, gate) = {
            let attempt = self.attempt.lock();
            loop {
                let observed = self.state();
                if matches!(observed, Undeploying | Undeployed | Failed) {
                    debug!("Stop of {} ignored in state {}", self, observed);
                    return;
                }
                if self.transition(observed, Undeploying) {
                    let gate = match observed {
                        AllocatingContext => attempt.allocating.clone(),
                        Deploying => attempt.deploying.clone(),
                        _ => None,
                    };
                    break (observed, gate);
                }
            }
        };

        info!("Undeploying {} (was {})", self, observed);
        self.emit(WebEventPhase::Undeploying);

        if let Some(gate) = gate {
            debug!("Waiting for the in-flight {} step of {}", observed, self);
            if !gate.wait(self.context.gate_timeout) {
                warn!(
                    "⚠️ {} step of {} did not finish within {:?}, resources may be left in an inconsistent state",
                    observed, self, self.context.gate_timeout
                );
            }
        }

        self.release_resources();
        self.transition(Undeploying, Undeployed);
        info!("{} undeployed", self);
        self.emit(WebEventPhase::Undeployed);
    }

    /// 有新的 runtime 可用; 等待中的單元會重新配置 context path.
    /// 換成另一個 runtime 時, 舊的先當作消失處理
    pub fn runtime_available(self: &Arc<Self>, runtime: Arc<dyn WebRuntime>) {
        if let Some(previous) = self.runtime.current() {
            if !same_runtime(&previous, &runtime) {
                debug!(
                    "Runtime {} replaces {} for {}",
                    runtime.name(),
                    previous.name(),
                    self
                );
                self.runtime_lost(&previous);
            }
        }

        let name = runtime.name().to_string();
        let gate = self.runtime.replace_with(runtime, || {
            self.arm(WaitingForRuntime, AllocatingContext)
        });
        if let Some(gate) = gate {
            info!("Runtime {} available, resuming {}", name, self);
            self.schedule(Step::Allocate(gate));
        }
    }

    /// runtime 消失; 已部署的單元取消註冊後回到 WaitingForRuntime, context path 保留
    pub fn runtime_lost(&self, runtime: &Arc<dyn WebRuntime>) {
        if !self.runtime.remove_if(runtime) {
            return;
        }
        debug!("Runtime {} lost by {}", runtime.name(), self);

        for _ in 0..RUNTIME_LOSS_ROUNDS {
            let state = self.state();
            match state {
                AllocatingContext | Deploying => {
                    let Some(gate) = self.current_gate(state) else {
                        return;
                    };
                    if !gate.wait(self.context.gate_timeout) {
                        warn!(
                            "⚠️ {} step of {} did not finish after runtime loss",
                            state, self
                        );
                        return;
                    }
                }
                Deployed => {
                    // 轉換與取出註冊在同一把鎖內, 之後的重新註冊不會被誤取
                    let registered = {
                        let mut resources = self.resources.lock();
                        if !self.transition(Deployed, WaitingForRuntime) {
                            continue;
                        }
                        resources.registered_with.take()
                    };
                    info!("Runtime lost, undeploying {} until a runtime returns", self);
                    self.emit(WebEventPhase::Undeploying);
                    if let Some(runtime) = registered {
                        if let Err(e) = runtime.unregister(&self.module) {
                            warn!("Failed to unregister {}: {}", self, e);
                        }
                    }
                    self.notify_waiting();
                    return;
                }
                WaitingForContextPath => {
                    if self.transition(WaitingForContextPath, WaitingForRuntime) {
                        self.notify_waiting();
                        return;
                    }
                }
                _ => return,
            }
        }
        warn!("{} did not settle after runtime loss (state {})", self, self.state());
    }

    /// 佔用 context path 的單元已釋放後, 再次嘗試配置
    pub fn retry_context_allocation(self: &Arc<Self>) -> bool {
        match self.arm(WaitingForContextPath, AllocatingContext) {
            Some(gate) => {
                info!("Retrying context path allocation for {}", self);
                self.schedule(Step::Allocate(gate));
                true
            }
            None => false,
        }
    }

    fn schedule(self: &Arc<Self>, step: Step) {
        let app = Arc::clone(self);
        self.context
            .scheduler
            .submit(Box::new(move || app.run(step)));
    }

    fn run(self: &Arc<Self>, step: Step) {
        let outcome = match &step {
            Step::Configure => self.configure(),
            Step::Allocate(_) => self.allocate(),
            Step::Register(_) => self.register(),
        };
        let next = match outcome {
            Ok(next) => next,
            Err(e) => {
                self.fail(step.state(), e);
                None
            }
        };
        // 資源狀態都記錄好之後才放行等待中的 stop
        if let Some(gate) = step.gate() {
            gate.release();
        }
        if let Some(next) = next {
            self.schedule(next);
        }
    }

    fn configure(&self) -> Result<Option<Step>> {
        debug!("Configuring {}", self);
        let model = self.context.resolver.resolve(&self.module)?;
        *self.model.lock() = Some(Arc::new(model));
        Ok(self
            .arm(Configuring, AllocatingContext)
            .map(Step::Allocate))
    }

    fn allocate(&self) -> Result<Option<Step>> {
        let Some(runtime) = self.current_runtime_or_wait(AllocatingContext) else {
            return Ok(None);
        };
        if self.state() != AllocatingContext {
            return Ok(None);
        }

        if !runtime.allocate_context_path(&self.module, &self.context_path)? {
            let collisions: Vec<_> = runtime
                .context_path_holder(&self.context_path)
                .into_iter()
                .filter(|id| *id != self.module.id)
                .collect();
            if self.transition(AllocatingContext, WaitingForContextPath) {
                warn!(
                    "⚠️ Context path {} of {} is already in use by {:?}",
                    self.context_path, self, collisions
                );
                self.context.events.send(
                    self.event(WebEventPhase::Failed)
                        .awaiting_context(collisions)
                        .with_error(format!("context path {} is in use", self.context_path)),
                );
            }
            return Ok(None);
        }

        debug!("Allocated {} on {} for {}", self.context_path, runtime.name(), self);
        let previous = self
            .resources
            .lock()
            .allocated_on
            .replace(Arc::clone(&runtime));
        // 換過 runtime: 歸還舊 runtime 上的 context path
        if let Some(previous) = previous.filter(|p| !same_runtime(p, &runtime)) {
            debug!(
                "Releasing {} held on previous runtime {} for {}",
                self.context_path,
                previous.name(),
                self
            );
            if let Err(e) = previous.release_context_path(&self.module, &self.context_path) {
                warn!("Failed to release {} of {}: {}", self.context_path, self, e);
            }
        }
        Ok(self.arm(AllocatingContext, Deploying).map(Step::Register))
    }

    fn register(&self) -> Result<Option<Step>> {
        let Some(runtime) = self.current_runtime_or_wait(Deploying) else {
            return Ok(None);
        };
        if self.state() != Deploying {
            return Ok(None);
        }
        let allocated_here = self
            .resources
            .lock()
            .allocated_on
            .as_ref()
            .is_some_and(|allocated| same_runtime(allocated, &runtime));
        if !allocated_here {
            // 配置之後 runtime 被換掉: 在目前的 runtime 上重新配置
            debug!(
                "{} is not allocated on {}, allocating again",
                self,
                runtime.name()
            );
            if self.transition(Deploying, WaitingForRuntime) {
                return Ok(self
                    .arm(WaitingForRuntime, AllocatingContext)
                    .map(Step::Allocate));
            }
            return Ok(None);
        }

        let model = self
            .model()
            .ok_or_else(|| ExtenderError::illegal_state(format!("{} has no model", self)))?;
        let registration = model.registration(&self.module, &self.context_path);
        if let Err(e) = runtime.register(&registration) {
            // 可能已部分註冊
            if let Err(rollback) = runtime.unregister(&self.module) {
                warn!("Rollback of {} failed: {}", self, rollback);
            }
            return Err(e);
        }
        self.resources.lock().registered_with = Some(Arc::clone(&runtime));

        if self.transition(Deploying, Deployed) {
            self.waiting_notified.store(false, Ordering::Release);
            info!("✅ {} deployed on {}", self, runtime.name());
            self.emit(WebEventPhase::Deployed);
        }
        Ok(None)
    }

    fn fail(&self, from: LifecycleState, err: ExtenderError) {
        if self.transition(from, Failed) {
            error!("❌ {} failed in {}: {}", self, from, err);
            self.release_resources();
            self.context
                .events
                .send(self.event(WebEventPhase::Failed).with_error(&err));
        } else {
            warn!(
                "{} step of {} failed after the unit moved on (now {}): {}",
                from,
                self,
                self.state(),
                err
            );
        }
    }

    /// 在 runtime 鎖內讀取; 沒有 runtime 時轉入 WaitingForRuntime
    fn current_runtime_or_wait(&self, from: LifecycleState) -> Option<Arc<dyn WebRuntime>> {
        self.runtime.with_current(|current| match current {
            Some(runtime) => Some(Arc::clone(runtime)),
            None => {
                if self.transition(from, WaitingForRuntime) {
                    self.notify_waiting();
                }
                None
            }
        })
    }

    fn release_resources(&self) {
        let (registered, allocated) = {
            let mut resources = self.resources.lock();
            (
                resources.registered_with.take(),
                resources.allocated_on.take(),
            )
        };
        if let Some(runtime) = registered {
            if let Err(e) = runtime.unregister(&self.module) {
                warn!("Failed to unregister {}: {}", self, e);
            }
        }
        if let Some(runtime) = allocated {
            if let Err(e) = runtime.release_context_path(&self.module, &self.context_path) {
                warn!("Failed to release {} of {}: {}", self.context_path, self, e);
            }
            if let Some(listener) = &self.context.on_context_released {
                listener(&self.module, &self.context_path);
            }
        }
    }

    /// CAS 轉換; 進入 AllocatingContext/Deploying 時同時建立這次嘗試的 gate
    fn arm(&self, from: LifecycleState, to: LifecycleState) -> Option<CompletionGate> {
        let mut attempt = self.attempt.lock();
        if !self.transition(from, to) {
            return None;
        }
        let gate = CompletionGate::new();
        match to {
            AllocatingContext => attempt.allocating = Some(gate.clone()),
            Deploying => attempt.deploying = Some(gate.clone()),
            _ => {}
        }
        Some(gate)
    }

    fn current_gate(&self, state: LifecycleState) -> Option<CompletionGate> {
        let attempt = self.attempt.lock();
        match state {
            AllocatingContext => attempt.allocating.clone(),
            Deploying => attempt.deploying.clone(),
            _ => None,
        }
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        debug_assert!(from.allows(to), "{} -> {}", from, to);
        let mut history = self.history.lock();
        if self.state.compare_exchange(from, to) {
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back((from, to));
            true
        } else {
            false
        }
    }

    /// 同一次等待只通知一次, 直到再次部署成功
    fn notify_waiting(&self) {
        if !self.waiting_notified.swap(true, Ordering::AcqRel) {
            info!("⏳ {} is waiting for a web runtime", self);
            self.emit(WebEventPhase::Waiting);
        }
    }

    fn event(&self, phase: WebEventPhase) -> WebEvent {
        WebEvent::new(&self.module, &self.context_path, phase)
    }

    fn emit(&self, phase: WebEventPhase) {
        self.context.events.send(self.event(phase));
    }
}

impl fmt::Display for WebApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Web Application \"{}\" for module {}",
            self.context_path, self.module
        )
    }
}

impl fmt::Debug for WebApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebApplication")
            .field("module", &self.module)
            .field("context_path", &self.context_path)
            .field("state", &self.state())
            .finish()
    }
}
