use crate::domain::model::{CodeLocation, RelativeOrdering, WebDescriptor};
use crate::utils::error::{ExtenderError, Result};
use std::collections::HashSet;
use tracing::warn;

/// 片段來源: 單元自己的封裝 (內嵌函式庫、附掛 fragment) 或可達模組
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOrigin {
    OwnPackage,
    ReachableModule,
}

/// Application 片段參與排序; Container 片段永遠排在最後且不對外公開
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Application,
    Container,
}

#[derive(Debug, Clone)]
pub struct Fragment {
    pub name: String,
    /// 由程式碼來源衍生的名稱 (jar 檔名或 `symbolic-version.bundle`)
    pub source_name: String,
    pub origin: FragmentOrigin,
    pub has_descriptor: bool,
    pub descriptor: WebDescriptor,
    pub location: CodeLocation,
}

impl Fragment {
    /// 沒有描述檔的片段, 名稱即來源名稱
    pub fn synthetic(source_name: String, origin: FragmentOrigin, location: CodeLocation) -> Self {
        Self {
            name: source_name.clone(),
            source_name,
            origin,
            has_descriptor: false,
            descriptor: WebDescriptor::default(),
            location,
        }
    }

    pub fn with_descriptor(
        source_name: String,
        origin: FragmentOrigin,
        location: CodeLocation,
        descriptor: WebDescriptor,
    ) -> Self {
        let name = descriptor
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| source_name.clone());
        Self {
            name,
            source_name,
            origin,
            has_descriptor: true,
            descriptor,
            location,
        }
    }

    pub fn kind(&self) -> FragmentKind {
        match (self.origin, self.has_descriptor) {
            (FragmentOrigin::ReachableModule, false) => FragmentKind::Container,
            _ => FragmentKind::Application,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind() == FragmentKind::Container
    }

    pub fn ordering(&self) -> &RelativeOrdering {
        &self.descriptor.ordering
    }
}

/// 依發現順序累積片段並維持名稱唯一
#[derive(Debug, Default)]
pub struct FragmentSet {
    fragments: Vec<Fragment>,
    names: HashSet<String>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 名稱重複時改用來源名稱; 來源名稱不可用則為 Conflict
    pub fn add(&mut self, mut fragment: Fragment) -> Result<()> {
        if self.names.contains(&fragment.name) {
            let duplicate = fragment.name.clone();
            if fragment.source_name == duplicate || self.names.contains(&fragment.source_name) {
                return Err(ExtenderError::conflict(format!(
                    "Can't add a fragment named \"{}\" from {}. It is already added",
                    duplicate, fragment.location
                )));
            }
            warn!(
                "There already exists a web fragment named {}. Renaming to {}",
                duplicate, fragment.source_name
            );
            fragment.name = fragment.source_name.clone();
        }
        self.names.insert(fragment.name.clone());
        self.fragments.push(fragment);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn into_vec(self) -> Vec<Fragment> {
        self.fragments
    }
}
