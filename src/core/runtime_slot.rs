use crate::domain::ports::WebRuntime;
use parking_lot::Mutex;
use std::sync::Arc;

/// 目前可用的 web runtime; 讀取與依結果分支在同一把鎖內完成
#[derive(Default)]
pub struct RuntimeSlot {
    current: Mutex<Option<Arc<dyn WebRuntime>>>,
}

impl RuntimeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<dyn WebRuntime>> {
        self.current.lock().clone()
    }

    /// 在鎖內讀取並執行 `f`
    pub fn with_current<R>(&self, f: impl FnOnce(Option<&Arc<dyn WebRuntime>>) -> R) -> R {
        let guard = self.current.lock();
        f(guard.as_ref())
    }

    /// 在鎖內替換並執行 `f`
    pub fn replace_with<R>(&self, runtime: Arc<dyn WebRuntime>, f: impl FnOnce() -> R) -> R {
        let mut guard = self.current.lock();
        *guard = Some(runtime);
        f()
    }

    /// 只有目前持有的正是 `runtime` 時才清除
    pub fn remove_if(&self, runtime: &Arc<dyn WebRuntime>) -> bool {
        let mut guard = self.current.lock();
        match guard.as_ref() {
            Some(current) if same_runtime(current, runtime) => {
                *guard = None;
                true
            }
            _ => false,
        }
    }
}

pub fn same_runtime(a: &Arc<dyn WebRuntime>, b: &Arc<dyn WebRuntime>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryWebRuntime;

    #[test]
    fn test_remove_only_matching_runtime() {
        let slot = RuntimeSlot::new();
        let first: Arc<dyn WebRuntime> = Arc::new(InMemoryWebRuntime::new("first"));
        let second: Arc<dyn WebRuntime> = Arc::new(InMemoryWebRuntime::new("second"));

        slot.replace_with(Arc::clone(&first), || ());
        assert!(!slot.remove_if(&second));
        assert_eq!(slot.with_current(|rt| rt.map(|r| r.name().to_string())), Some("first".to_string()));
        assert!(slot.remove_if(&first));
        assert!(slot.current().is_none());
    }
}
