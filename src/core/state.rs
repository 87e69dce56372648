use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 部署單元的生命週期狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Unconfigured = 0,
    Configuring = 1,
    AllocatingContext = 2,
    Deploying = 3,
    Deployed = 4,
    WaitingForRuntime = 5,
    WaitingForContextPath = 6,
    Undeploying = 7,
    Undeployed = 8,
    Failed = 9,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Unconfigured,
            1 => LifecycleState::Configuring,
            2 => LifecycleState::AllocatingContext,
            3 => LifecycleState::Deploying,
            4 => LifecycleState::Deployed,
            5 => LifecycleState::WaitingForRuntime,
            6 => LifecycleState::WaitingForContextPath,
            7 => LifecycleState::Undeploying,
            8 => LifecycleState::Undeployed,
            _ => LifecycleState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Undeployed | LifecycleState::Failed)
    }

    /// 狀態圖中合法的邊
    pub fn allows(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Unconfigured, Configuring) => true,
            (Configuring, AllocatingContext) => true,
            (AllocatingContext, Deploying | WaitingForRuntime | WaitingForContextPath) => true,
            (Deploying, Deployed | WaitingForRuntime) => true,
            (Deployed, WaitingForRuntime) => true,
            (WaitingForRuntime, AllocatingContext) => true,
            (WaitingForContextPath, AllocatingContext | WaitingForRuntime) => true,
            (Configuring | AllocatingContext | Deploying, Failed) => true,
            (Undeploying, Undeployed) => true,
            (from, Undeploying) => !from.is_terminal() && from != Undeploying,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unconfigured => "UNCONFIGURED",
            LifecycleState::Configuring => "CONFIGURING",
            LifecycleState::AllocatingContext => "ALLOCATING_CONTEXT",
            LifecycleState::Deploying => "DEPLOYING",
            LifecycleState::Deployed => "DEPLOYED",
            LifecycleState::WaitingForRuntime => "WAITING_FOR_RUNTIME",
            LifecycleState::WaitingForContextPath => "WAITING_FOR_CONTEXT_PATH",
            LifecycleState::Undeploying => "UNDEPLOYING",
            LifecycleState::Undeployed => "UNDEPLOYED",
            LifecycleState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// 以 compare-and-swap 變更的狀態欄位
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// 只有目前狀態等於 `from` 時才變更
    pub fn compare_exchange(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_forward_path_is_allowed() {
        let path = [Unconfigured, Configuring, AllocatingContext, Deploying, Deployed];
        for pair in path.windows(2) {
            assert!(pair[0].allows(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!Unconfigured.allows(Deployed));
        assert!(!Configuring.allows(Deploying));
    }

    #[test]
    fn test_terminal_states() {
        assert!(Failed.is_terminal());
        assert!(Undeployed.is_terminal());
        assert!(!Failed.allows(Undeploying));
        assert!(!Undeployed.allows(Undeploying));
        assert!(Deployed.allows(Undeploying));
        assert!(WaitingForContextPath.allows(Undeploying));
        assert!(!Deployed.allows(Failed));
    }

    #[test]
    fn test_compare_exchange() {
        let state = AtomicState::new(Unconfigured);
        assert!(state.compare_exchange(Unconfigured, Configuring));
        assert!(!state.compare_exchange(Unconfigured, Configuring));
        assert_eq!(state.load(), Configuring);
    }
}
