use crate::domain::model::{
    ClassInfo, CodeLocation, ModuleId, ModuleRef, Registration, TypeHandle, WebDescriptor,
};
use crate::utils::error::Result;

/// 描述檔解析與合併
pub trait DescriptorEngine: Send + Sync {
    fn parse(&self, source_name: &str, bytes: &[u8]) -> Result<WebDescriptor>;

    /// overlay 有設定的欄位優先, 未設定者沿用 base
    fn merge(&self, base: &WebDescriptor, overlay: &WebDescriptor) -> Result<WebDescriptor>;
}

pub trait ClassInspector: Send + Sync {
    fn inspect(&self, bytes: &[u8]) -> Result<ClassInfo>;
}

/// 模組系統: 程式碼位置、連線關係與型別載入
pub trait ModuleSystem: Send + Sync {
    /// 單元自身 class path 上的目錄位置
    fn class_directories(&self, unit: &ModuleRef) -> Vec<CodeLocation>;

    /// 單元內嵌的函式庫
    fn embedded_libraries(&self, unit: &ModuleRef) -> Vec<CodeLocation>;

    /// 附掛在 host 上的 fragment 模組
    fn attached_fragments(&self, host: &ModuleRef) -> Vec<ModuleRef>;

    /// 直接連線的模組 (不含遞移)
    fn reachable_modules(&self, module: &ModuleRef) -> Vec<ModuleRef>;

    fn fragment_host(&self, module: &ModuleRef) -> Option<ModuleRef>;

    fn is_fragment_of(&self, fragment: &ModuleRef, host: &ModuleRef) -> bool {
        self.fragment_host(fragment)
            .map(|h| h.id == host.id)
            .unwrap_or(false)
    }

    fn root(&self, module: &ModuleRef) -> CodeLocation {
        CodeLocation::root(module.clone())
    }

    /// 位置內所有項目的相對路徑, 已排序
    fn list_entries(&self, location: &CodeLocation) -> Result<Vec<String>>;

    fn read_entry(&self, location: &CodeLocation, path: &str) -> Result<Option<Vec<u8>>>;

    /// 從模組的 class space 找出型別的原始位元組, 連同定義它的模組
    fn find_class(&self, from: &ModuleRef, type_name: &str) -> Result<Option<(ModuleRef, Vec<u8>)>>;

    /// 載入型別; 找不到時回傳 TypeNotFound
    fn load_type(&self, module: &ModuleRef, type_name: &str) -> Result<TypeHandle>;
}

/// Web runtime 的註冊介面
pub trait WebRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// false 代表 context path 已被其他單元佔用; 同一單元重複配置視為成功
    fn allocate_context_path(&self, unit: &ModuleRef, context_path: &str) -> Result<bool>;

    fn context_path_holder(&self, context_path: &str) -> Option<ModuleId>;

    fn register(&self, registration: &Registration) -> Result<()>;

    fn unregister(&self, unit: &ModuleRef) -> Result<()>;

    fn release_context_path(&self, unit: &ModuleRef, context_path: &str) -> Result<()>;
}

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    fn submit(&self, task: Task);
}
