use crate::class_space::cache::ClassCache;
use crate::domain::model::{AnnotationInfo, ClassInfo, FilterDef, WebDescriptor};
use std::collections::BTreeMap;
use tracing::{trace, warn};

pub const WEB_SERVLET: &str = "javax.servlet.annotation.WebServlet";
pub const WEB_FILTER: &str = "javax.servlet.annotation.WebFilter";
pub const WEB_LISTENER: &str = "javax.servlet.annotation.WebListener";
pub const HTTP_SERVLET: &str = "javax.servlet.http.HttpServlet";
pub const FILTER: &str = "javax.servlet.Filter";

/// 把類別上的 servlet / filter / listener 註解併入描述檔; 只處理第一個符合的註解.
/// 描述檔已宣告的值優先, 註解只補上未設定的部分
pub fn collect_component(
    class: &ClassInfo,
    descriptor: &mut WebDescriptor,
    cache: &mut ClassCache<'_>,
) {
    if class.annotations.is_empty() {
        return;
    }
    cache.add(class);

    for annotation in &class.annotations {
        match annotation.type_name.as_str() {
            WEB_SERVLET => {
                trace!("      Processing annotated servlet {}", class.name);
                if cache.extends(&class.name, HTTP_SERVLET) {
                    add_servlet(class, annotation, descriptor);
                } else {
                    warn!(
                        "{} annotated with @WebServlet doesn't extend {}, ignoring it",
                        class.name, HTTP_SERVLET
                    );
                }
                return;
            }
            WEB_FILTER => {
                trace!("      Processing annotated filter {}", class.name);
                if class.interfaces.iter().any(|i| i == FILTER) {
                    add_filter(class, annotation, descriptor);
                } else {
                    warn!(
                        "{} annotated with @WebFilter doesn't implement {}, ignoring it",
                        class.name, FILTER
                    );
                }
                return;
            }
            WEB_LISTENER => {
                trace!("      Processing annotated listener {}", class.name);
                if !descriptor.listeners.contains(&class.name) {
                    descriptor.listeners.push(class.name.clone());
                }
                return;
            }
            _ => {}
        }
    }
}

/// `value` 與 `urlPatterns` 擇一
fn url_patterns(class: &ClassInfo, annotation: &AnnotationInfo) -> Vec<String> {
    let patterns = annotation.element("urlPatterns");
    if annotation.values.is_empty() {
        return patterns.to_vec();
    }
    if !patterns.is_empty() {
        warn!(
            "{} has both value and urlPatterns in @{}, using value",
            class.name, annotation.type_name
        );
    }
    annotation.values.clone()
}

/// `initParams` 的每一項為 `name=value`
fn init_params(class: &ClassInfo, annotation: &AnnotationInfo) -> BTreeMap<String, String> {
    annotation
        .element("initParams")
        .iter()
        .filter_map(|param| match param.split_once('=') {
            Some((name, value)) => Some((name.trim().to_string(), value.trim().to_string())),
            None => {
                warn!("{} has a malformed init param {:?}", class.name, param);
                None
            }
        })
        .collect()
}

fn add_servlet(class: &ClassInfo, annotation: &AnnotationInfo, descriptor: &mut WebDescriptor) {
    let name = annotation.first("name").unwrap_or(&class.name).to_string();
    let load_on_startup = annotation
        .first("loadOnStartup")
        .and_then(|value| match value.trim().parse::<i32>() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!("{} has a non-numeric loadOnStartup {:?}", class.name, value);
                None
            }
        });

    let servlet = descriptor.servlets.entry(name).or_default();
    if servlet.class.is_none() {
        servlet.class = Some(class.name.clone());
    }
    if servlet.load_on_startup.is_none() {
        servlet.load_on_startup = load_on_startup;
    }
    for (key, value) in init_params(class, annotation) {
        servlet.init_params.entry(key).or_insert(value);
    }
    // 描述檔已有對應時不再加入
    if servlet.url_patterns.is_empty() {
        servlet.url_patterns = url_patterns(class, annotation);
    }
}

fn add_filter(class: &ClassInfo, annotation: &AnnotationInfo, descriptor: &mut WebDescriptor) {
    let name = annotation.first("filterName").unwrap_or(&class.name).to_string();

    match descriptor.filters.get_mut(&name) {
        Some(filter) => {
            if filter.class.is_none() {
                filter.class = Some(class.name.clone());
            }
            for (key, value) in init_params(class, annotation) {
                filter.init_params.entry(key).or_insert(value);
            }
        }
        None => {
            descriptor.filters.insert(
                name,
                FilterDef {
                    class: Some(class.name.clone()),
                    url_patterns: url_patterns(class, annotation),
                    servlet_names: annotation.element("servletNames").to_vec(),
                    dispatchers: annotation.element("dispatcherTypes").to_vec(),
                    init_params: init_params(class, annotation),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_space::cache::SignatureSource;
    use crate::domain::model::ServletDef;
    use std::collections::BTreeSet;

    struct NoSignatures;

    impl SignatureSource for NoSignatures {
        fn signature(&self, _type_name: &str) -> Option<ClassInfo> {
            None
        }
    }

    fn collect(classes: &[ClassInfo], descriptor: &mut WebDescriptor) {
        let interests: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut cache = ClassCache::new("java.lang.Object", &interests, &NoSignatures);
        for class in classes {
            collect_component(class, descriptor, &mut cache);
        }
    }

    fn servlet_class() -> ClassInfo {
        ClassInfo::new("com.example.ShopServlet")
            .extends(HTTP_SERVLET)
            .with_annotation(
                AnnotationInfo::new(WEB_SERVLET)
                    .with_values(&["/shop/*"])
                    .with_element("name", &["shop"])
                    .with_element("loadOnStartup", &["2"])
                    .with_element("initParams", &["mode=fast", "locale=en"]),
            )
    }

    #[test]
    fn test_annotated_servlet_is_added() {
        let mut descriptor = WebDescriptor::default();
        collect(&[servlet_class()], &mut descriptor);

        let servlet = &descriptor.servlets["shop"];
        assert_eq!(servlet.class.as_deref(), Some("com.example.ShopServlet"));
        assert_eq!(servlet.url_patterns, vec!["/shop/*"]);
        assert_eq!(servlet.load_on_startup, Some(2));
        assert_eq!(servlet.init_params["mode"], "fast");
    }

    #[test]
    fn test_descriptor_values_win_over_annotation() {
        let mut descriptor = WebDescriptor::default();
        descriptor.servlets.insert(
            "shop".to_string(),
            ServletDef {
                class: Some("com.example.Declared".to_string()),
                url_patterns: vec!["/declared".to_string()],
                load_on_startup: None,
                init_params: BTreeMap::from([("mode".to_string(), "slow".to_string())]),
            },
        );
        collect(&[servlet_class()], &mut descriptor);

        let servlet = &descriptor.servlets["shop"];
        assert_eq!(servlet.class.as_deref(), Some("com.example.Declared"));
        assert_eq!(servlet.url_patterns, vec!["/declared"]);
        assert_eq!(servlet.load_on_startup, Some(2));
        assert_eq!(servlet.init_params["mode"], "slow");
        assert_eq!(servlet.init_params["locale"], "en");
    }

    #[test]
    fn test_servlet_must_extend_http_servlet() {
        let class = ClassInfo::new("com.example.NotAServlet")
            .extends("java.lang.Object")
            .annotated(WEB_SERVLET, &["/x"]);
        let mut descriptor = WebDescriptor::default();
        collect(&[class], &mut descriptor);
        assert!(descriptor.servlets.is_empty());
    }

    #[test]
    fn test_filter_and_listener() {
        let filter = ClassInfo::new("com.example.AuditFilter")
            .implements(FILTER)
            .with_annotation(
                AnnotationInfo::new(WEB_FILTER)
                    .with_element("urlPatterns", &["/*"])
                    .with_element("servletNames", &["shop"])
                    .with_element("dispatcherTypes", &["REQUEST", "FORWARD"]),
            );
        let not_a_filter = ClassInfo::new("com.example.Plain").annotated(WEB_FILTER, &["/plain"]);
        let listener = ClassInfo::new("com.example.Startup").annotated(WEB_LISTENER, &[]);

        let mut descriptor = WebDescriptor::default();
        collect(&[filter, not_a_filter, listener.clone(), listener], &mut descriptor);

        assert_eq!(descriptor.filters.len(), 1);
        let filter = &descriptor.filters["com.example.AuditFilter"];
        assert_eq!(filter.url_patterns, vec!["/*"]);
        assert_eq!(filter.servlet_names, vec!["shop"]);
        assert_eq!(filter.dispatchers, vec!["REQUEST", "FORWARD"]);
        assert_eq!(descriptor.listeners, vec!["com.example.Startup"]);
    }
}
