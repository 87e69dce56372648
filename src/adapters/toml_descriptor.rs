use crate::domain::model::{FilterDef, ServletDef, WebDescriptor};
use crate::domain::ports::DescriptorEngine;
use crate::utils::error::{ExtenderError, Result};
use std::collections::{BTreeMap, HashMap};

/// 以 TOML 表示的描述檔
#[derive(Debug, Clone, Default)]
pub struct TomlDescriptorEngine;

impl TomlDescriptorEngine {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorEngine for TomlDescriptorEngine {
    fn parse(&self, source_name: &str, bytes: &[u8]) -> Result<WebDescriptor> {
        let content = std::str::from_utf8(bytes)
            .map_err(|e| ExtenderError::parse(source_name, format!("invalid UTF-8: {}", e)))?;
        toml::from_str(content).map_err(|e| ExtenderError::parse(source_name, e.to_string()))
    }

    fn merge(&self, base: &WebDescriptor, overlay: &WebDescriptor) -> Result<WebDescriptor> {
        let mut servlets = base.servlets.clone();
        for (name, servlet) in &overlay.servlets {
            let merged = match servlets.get(name) {
                Some(existing) => merge_servlet(existing, servlet),
                None => servlet.clone(),
            };
            servlets.insert(name.clone(), merged);
        }
        check_url_patterns(&servlets)?;

        let mut filters = base.filters.clone();
        for (name, filter) in &overlay.filters {
            let merged = match filters.get(name) {
                Some(existing) => merge_filter(existing, filter),
                None => filter.clone(),
            };
            filters.insert(name.clone(), merged);
        }

        let mut listeners = base.listeners.clone();
        for listener in &overlay.listeners {
            if !listeners.contains(listener) {
                listeners.push(listener.clone());
            }
        }

        Ok(WebDescriptor {
            name: overlay.name.clone().or_else(|| base.name.clone()),
            display_name: overlay
                .display_name
                .clone()
                .or_else(|| base.display_name.clone()),
            metadata_complete: overlay.metadata_complete,
            absolute_ordering: overlay
                .absolute_ordering
                .clone()
                .or_else(|| base.absolute_ordering.clone()),
            ordering: if overlay.ordering.is_empty() {
                base.ordering.clone()
            } else {
                overlay.ordering.clone()
            },
            context_params: merge_params(&base.context_params, &overlay.context_params),
            servlets,
            filters,
            listeners,
            welcome_files: if overlay.welcome_files.is_empty() {
                base.welcome_files.clone()
            } else {
                overlay.welcome_files.clone()
            },
        })
    }
}

fn merge_params(
    base: &BTreeMap<String, String>,
    overlay: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn merge_servlet(base: &ServletDef, overlay: &ServletDef) -> ServletDef {
    ServletDef {
        class: overlay.class.clone().or_else(|| base.class.clone()),
        url_patterns: if overlay.url_patterns.is_empty() {
            base.url_patterns.clone()
        } else {
            overlay.url_patterns.clone()
        },
        load_on_startup: overlay.load_on_startup.or(base.load_on_startup),
        init_params: merge_params(&base.init_params, &overlay.init_params),
    }
}

fn merge_filter(base: &FilterDef, overlay: &FilterDef) -> FilterDef {
    FilterDef {
        class: overlay.class.clone().or_else(|| base.class.clone()),
        url_patterns: if overlay.url_patterns.is_empty() {
            base.url_patterns.clone()
        } else {
            overlay.url_patterns.clone()
        },
        servlet_names: if overlay.servlet_names.is_empty() {
            base.servlet_names.clone()
        } else {
            overlay.servlet_names.clone()
        },
        dispatchers: if overlay.dispatchers.is_empty() {
            base.dispatchers.clone()
        } else {
            overlay.dispatchers.clone()
        },
        init_params: merge_params(&base.init_params, &overlay.init_params),
    }
}

/// 同一 URL pattern 不可對應兩個 servlet
fn check_url_patterns(servlets: &BTreeMap<String, ServletDef>) -> Result<()> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for (name, servlet) in servlets {
        for pattern in &servlet.url_patterns {
            if let Some(other) = owners.insert(pattern.as_str(), name.as_str()) {
                if other != name {
                    return Err(ExtenderError::conflict(format!(
                        "URL pattern {} is mapped to both servlet {} and servlet {}",
                        pattern, other, name
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::OrderingEntry;

    fn parse(content: &str) -> WebDescriptor {
        TomlDescriptorEngine::new()
            .parse("test.toml", content.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_parse_descriptor() {
        let descriptor = parse(
            r#"
name = "f1"
absolute_ordering = ["f2", "others"]
listeners = ["com.example.Listener"]

[ordering]
before = ["others"]

[servlets.shop]
class = "com.example.ShopServlet"
url_patterns = ["/shop/*"]
load_on_startup = 1
"#,
        );
        assert_eq!(descriptor.name.as_deref(), Some("f1"));
        assert_eq!(
            descriptor.absolute_ordering,
            Some(vec![
                OrderingEntry::Named("f2".to_string()),
                OrderingEntry::Others
            ])
        );
        assert_eq!(descriptor.ordering.before, vec![OrderingEntry::Others]);
        assert_eq!(descriptor.servlets["shop"].load_on_startup, Some(1));
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = TomlDescriptorEngine::new()
            .parse("WEB-INF/web.xml", b"name = ")
            .unwrap_err();
        match err {
            ExtenderError::ParseError { source_name, .. } => assert_eq!(source_name, "WEB-INF/web.xml"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overlay_wins_where_set() {
        let engine = TomlDescriptorEngine::new();
        let base = parse(
            r#"
display_name = "Fragment"
welcome_files = ["index.html"]
listeners = ["com.example.A"]

[context_params]
mode = "fragment"
shared = "yes"

[servlets.shop]
class = "com.example.FragmentServlet"
url_patterns = ["/shop/*"]
"#,
        );
        let overlay = parse(
            r#"
listeners = ["com.example.B", "com.example.A"]

[context_params]
mode = "main"

[servlets.shop]
class = "com.example.MainServlet"
"#,
        );

        let merged = engine.merge(&base, &overlay).unwrap();
        assert_eq!(merged.display_name.as_deref(), Some("Fragment"));
        assert_eq!(merged.context_params["mode"], "main");
        assert_eq!(merged.context_params["shared"], "yes");
        assert_eq!(
            merged.servlets["shop"].class.as_deref(),
            Some("com.example.MainServlet")
        );
        assert_eq!(merged.servlets["shop"].url_patterns, vec!["/shop/*"]);
        assert_eq!(merged.listeners, vec!["com.example.A", "com.example.B"]);
        assert_eq!(merged.welcome_files, vec!["index.html"]);
    }

    #[test]
    fn test_conflicting_url_pattern() {
        let engine = TomlDescriptorEngine::new();
        let base = parse("[servlets.a]\nclass = \"A\"\nurl_patterns = [\"/x\"]\n");
        let overlay = parse("[servlets.b]\nclass = \"B\"\nurl_patterns = [\"/x\"]\n");
        let err = engine.merge(&base, &overlay).unwrap_err();
        assert!(matches!(err, ExtenderError::ConflictError { .. }));
    }
}
