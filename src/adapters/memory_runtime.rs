use crate::domain::model::{ModuleId, ModuleRef, Registration};
use crate::domain::ports::WebRuntime;
use crate::utils::error::{ExtenderError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// 對 runtime 的呼叫紀錄
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Allocate {
        unit: ModuleId,
        path: String,
        granted: bool,
    },
    Register {
        unit: ModuleId,
    },
    Unregister {
        unit: ModuleId,
    },
    Release {
        unit: ModuleId,
        path: String,
    },
}

#[derive(Debug, Default)]
struct RuntimeState {
    paths: BTreeMap<String, ModuleId>,
    registrations: BTreeMap<ModuleId, Registration>,
    calls: Vec<RuntimeCall>,
    failing: HashSet<ModuleId>,
}

/// 記憶體內的 web runtime: context path 登記表與註冊資料
#[derive(Debug)]
pub struct InMemoryWebRuntime {
    name: String,
    state: Mutex<RuntimeState>,
}

impl InMemoryWebRuntime {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RuntimeState::default()),
        }
    }

    /// 讓指定單元的 register 失敗
    pub fn fail_registration_for(&self, unit: ModuleId) {
        self.state.lock().failing.insert(unit);
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn registration(&self, unit: ModuleId) -> Option<Registration> {
        self.state.lock().registrations.get(&unit).cloned()
    }

    pub fn registered_units(&self) -> Vec<ModuleId> {
        self.state.lock().registrations.keys().copied().collect()
    }
}

impl WebRuntime for InMemoryWebRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_context_path(&self, unit: &ModuleRef, context_path: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let granted = match state.paths.get(context_path) {
            Some(holder) => *holder == unit.id,
            None => {
                state.paths.insert(context_path.to_string(), unit.id);
                true
            }
        };
        debug!(
            "[{}] allocate {} for {}: {}",
            self.name, context_path, unit, granted
        );
        state.calls.push(RuntimeCall::Allocate {
            unit: unit.id,
            path: context_path.to_string(),
            granted,
        });
        Ok(granted)
    }

    fn context_path_holder(&self, context_path: &str) -> Option<ModuleId> {
        self.state.lock().paths.get(context_path).copied()
    }

    fn register(&self, registration: &Registration) -> Result<()> {
        let mut state = self.state.lock();
        let unit = registration.unit.id;
        state.calls.push(RuntimeCall::Register { unit });
        if state.failing.contains(&unit) {
            return Err(ExtenderError::runtime(format!(
                "{} refused {}",
                self.name, registration.unit
            )));
        }
        if state.registrations.contains_key(&unit) {
            return Err(ExtenderError::runtime(format!(
                "{} is already registered in {}",
                registration.unit, self.name
            )));
        }
        state.registrations.insert(unit, registration.clone());
        Ok(())
    }

    fn unregister(&self, unit: &ModuleRef) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Unregister { unit: unit.id });
        state.registrations.remove(&unit.id);
        Ok(())
    }

    fn release_context_path(&self, unit: &ModuleRef, context_path: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Release {
            unit: unit.id,
            path: context_path.to_string(),
        });
        if state.paths.get(context_path) == Some(&unit.id) {
            state.paths.remove(context_path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::WebDescriptor;

    fn registration(unit: &ModuleRef) -> Registration {
        Registration {
            unit: unit.clone(),
            context_path: "/shop".to_string(),
            descriptor: WebDescriptor::default(),
            hooks: Vec::new(),
            ordered_libs: None,
        }
    }

    #[test]
    fn test_context_path_registry() {
        let runtime = InMemoryWebRuntime::new("memory");
        let a = ModuleRef::new(1, "a", "1.0.0");
        let b = ModuleRef::new(2, "b", "1.0.0");

        assert!(runtime.allocate_context_path(&a, "/shop").unwrap());
        assert!(runtime.allocate_context_path(&a, "/shop").unwrap());
        assert!(!runtime.allocate_context_path(&b, "/shop").unwrap());
        assert_eq!(runtime.context_path_holder("/shop"), Some(1));

        // 非持有者的釋放不影響登記
        runtime.release_context_path(&b, "/shop").unwrap();
        assert_eq!(runtime.context_path_holder("/shop"), Some(1));
        runtime.release_context_path(&a, "/shop").unwrap();
        assert!(runtime.allocate_context_path(&b, "/shop").unwrap());
    }

    #[test]
    fn test_register_once() {
        let runtime = InMemoryWebRuntime::new("memory");
        let a = ModuleRef::new(1, "a", "1.0.0");

        runtime.register(&registration(&a)).unwrap();
        assert!(runtime.register(&registration(&a)).is_err());
        runtime.unregister(&a).unwrap();
        assert!(runtime.registered_units().is_empty());

        runtime.fail_registration_for(1);
        assert!(runtime.register(&registration(&a)).is_err());
        assert_eq!(
            runtime.count_calls(|c| matches!(c, RuntimeCall::Register { .. })),
            3
        );
    }
}
