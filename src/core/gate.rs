use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct GateInner {
    released: Mutex<bool>,
    cond: Condvar,
}

/// 單次釋放的完成訊號: 一個釋放者, 多個有時限的等待者
#[derive(Debug, Clone, Default)]
pub struct CompletionGate {
    inner: Arc<GateInner>,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) {
        let mut released = self.inner.released.lock();
        if !*released {
            *released = true;
            self.inner.cond.notify_all();
        }
    }

    pub fn is_released(&self) -> bool {
        *self.inner.released.lock()
    }

    /// 等到釋放或逾時; 回傳是否已釋放
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.inner.released.lock();
        while !*released {
            if self
                .inner
                .cond
                .wait_until(&mut released, deadline)
                .timed_out()
            {
                return *released;
            }
        }
        true
    }
}
