use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use wab_extender::adapters::{
    InMemoryModuleSystem, InMemoryWebRuntime, InlineScheduler, JsonClassInspector,
    TomlDescriptorEngine,
};
use wab_extender::domain::ports::WebRuntime;
use wab_extender::utils::error::{ErrorCategory, ExtenderError};
use wab_extender::utils::validation::Validate;
use wab_extender::{ClassSpaceResolver, ExtenderConfig, LifecycleState, WarExtender};

const LAYOUT: &str = r#"
[[modules]]
id = 10
symbolic_name = "com.example.shop"
version = "1.2.0"
deploy = true
context_path = "/shop"
class_directories = ["WEB-INF/classes"]
embedded_libraries = ["WEB-INF/lib/payments.jar"]
wires = [20, 30]

[modules.entries]
"WEB-INF/web.xml" = """
display_name = "Shop"
absolute_ordering = ["payments", "others"]
"""
"WEB-INF/lib/payments.jar/META-INF/web-fragment.xml" = """
name = "payments"

[servlets.checkout]
class = "com.example.payments.CheckoutServlet"
url_patterns = ["/checkout/*"]
"""
"WEB-INF/classes/META-INF/services/javax.servlet.ServletContainerInitializer" = "com.example.ShopInitializer"

[[modules.classes]]
location = "WEB-INF/classes"
name = "com.example.ShopInitializer"
annotations = [{ type_name = "javax.servlet.annotation.HandlesTypes", values = ["com.example.Plugin"] }]

[[modules.classes]]
location = "WEB-INF/classes"
name = "com.example.Plugin"
is_annotation = false

[[modules.classes]]
location = "WEB-INF/lib/payments.jar"
name = "com.example.payments.CardPlugin"
interfaces = ["com.example.Plugin"]

[[modules]]
id = 20
symbolic_name = "org.example.util"

[[modules]]
id = 30
symbolic_name = "custom.platform.api"
"#;

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_deploys_layout_from_files() {
    std::env::set_var("WAB_CONFIG_TEST_IGNORED", "custom.platform.api");
    let config_file = temp_file(
        r#"
[extender]
pool_size = 1
gate_timeout_secs = 2
requeue_on_context_release = false

[class_space]
ignored_modules = ["${WAB_CONFIG_TEST_IGNORED}"]
"#,
    );
    let layout_file = temp_file(LAYOUT);

    let config = ExtenderConfig::from_file(config_file.path()).unwrap();
    std::env::remove_var("WAB_CONFIG_TEST_IGNORED");
    config.validate().unwrap();
    assert_eq!(config.class_space.ignored_modules, vec!["custom.platform.api"]);

    let modules = Arc::new(InMemoryModuleSystem::from_file(layout_file.path()).unwrap());
    let units = modules.deployable_units();
    assert_eq!(units.len(), 1);

    let resolver = Arc::new(ClassSpaceResolver::new(
        modules,
        Arc::new(TomlDescriptorEngine::new()),
        Arc::new(JsonClassInspector::new()),
        config.class_space.clone(),
    ));
    let extender = WarExtender::new(resolver, Arc::new(InlineScheduler), &config.extender);
    let runtime = Arc::new(InMemoryWebRuntime::new("memory"));
    let handle: Arc<dyn WebRuntime> = runtime.clone();
    extender.runtime_added(handle);

    let (module, context_path) = units[0].clone();
    let app = extender.module_started(module, &context_path).unwrap();
    assert_eq!(app.state(), LifecycleState::Deployed);

    let model = app.model().unwrap();
    assert_eq!(
        model.fragment_order,
        vec!["payments", "org.example.util-0.0.0.bundle"]
    );
    assert_eq!(model.ordered_libs, Some(vec!["payments.jar".to_string()]));
    assert_eq!(
        model.hooks.type_names_for("com.example.ShopInitializer"),
        vec!["com.example.payments.CardPlugin"]
    );

    let registration = runtime.registration(10).unwrap();
    assert_eq!(registration.descriptor.display_name.as_deref(), Some("Shop"));
    assert!(registration.descriptor.servlets.contains_key("checkout"));

    extender.shutdown();
    assert!(runtime.registered_units().is_empty());
}

#[test]
fn test_invalid_layout_is_reported() {
    let layout_file = temp_file(
        r#"
[[modules]]
id = 10
symbolic_name = "com.example.shop"
deploy = true
context_path = "shop"
"#,
    );
    let err = InMemoryModuleSystem::from_file(layout_file.path()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(!err.recovery_suggestion().is_empty());
}

#[test]
fn test_missing_config_file() {
    let err = ExtenderConfig::from_file("/nonexistent/wab-extender.toml").unwrap_err();
    assert!(matches!(err, ExtenderError::IoError(_)));
    assert!(!err.user_friendly_message().is_empty());
}
