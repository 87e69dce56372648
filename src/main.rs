use anyhow::Context;
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wab_extender::adapters::{
    InMemoryModuleSystem, InMemoryWebRuntime, JsonClassInspector, TokioScheduler,
    TomlDescriptorEngine,
};
use wab_extender::domain::ports::WebRuntime;
use wab_extender::utils::error::{ErrorSeverity, ExtenderError};
use wab_extender::utils::{logger, validation::Validate};
use wab_extender::{CliArgs, ClassSpaceResolver, ExtenderConfig, LifecycleState, WarExtender};

/// 等待所有單元離開進行中狀態的上限
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting wab-extender");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    if let Err(e) = run(&args).await {
        report_and_exit(&e);
    }
    Ok(())
}

async fn run(args: &CliArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => ExtenderConfig::from_file(path)?,
        None => ExtenderConfig::default(),
    };
    config.validate()?;

    let modules = Arc::new(InMemoryModuleSystem::from_file(&args.layout)?);
    let units = modules.deployable_units();
    tracing::info!("📦 Loaded layout with {} deployable unit(s)", units.len());

    let resolver = Arc::new(ClassSpaceResolver::new(
        modules,
        Arc::new(TomlDescriptorEngine::new()),
        Arc::new(JsonClassInspector::new()),
        config.class_space.clone(),
    ));
    let scheduler = Arc::new(TokioScheduler::current(config.extender.pool_size)?);
    let extender = WarExtender::new(resolver, scheduler, &config.extender);

    let mut events = extender.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event.error {
                Some(error) => println!(
                    "[{}] {:<12} {} {} ({})",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    event.phase,
                    event.context_path,
                    event.module,
                    error
                ),
                None => println!(
                    "[{}] {:<12} {} {}",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    event.phase,
                    event.context_path,
                    event.module
                ),
            }
        }
    });

    for (module, context_path) in &units {
        extender.module_started(module.clone(), context_path)?;
    }

    let runtime = Arc::new(InMemoryWebRuntime::new("memory"));
    let handle: Arc<dyn WebRuntime> = runtime.clone();
    {
        let extender = extender.clone();
        tokio::task::spawn_blocking(move || extender.runtime_added(handle))
            .await
            .context("adding the web runtime")?;
    }

    settle(&extender).await;
    print_summary(&extender, &runtime)?;

    {
        let extender = extender.clone();
        tokio::task::spawn_blocking(move || extender.shutdown())
            .await
            .context("shutting down")?;
    }

    // 讓最後的事件印出
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    tracing::info!("✅ All web applications stopped");
    Ok(())
}

/// 輪詢直到沒有單元停在 Configuring/AllocatingContext/Deploying
async fn settle(extender: &WarExtender) {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    loop {
        let busy = extender
            .applications()
            .iter()
            .filter(|app| {
                matches!(
                    app.state(),
                    LifecycleState::Unconfigured
                        | LifecycleState::Configuring
                        | LifecycleState::AllocatingContext
                        | LifecycleState::Deploying
                )
            })
            .count();
        if busy == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("⚠️ {} unit(s) still busy after {:?}", busy, SETTLE_TIMEOUT);
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn print_summary(extender: &WarExtender, runtime: &InMemoryWebRuntime) -> anyhow::Result<()> {
    println!();
    println!("📊 Deployment summary");
    for app in extender.applications() {
        println!("  {} -> {}", app, app.state());
        let Some(model) = app.model() else {
            continue;
        };
        println!("    fragment order: {:?}", model.fragment_order);
        println!("    ordered libs:   {:?}", model.ordered_libs);

        let hooks: BTreeMap<&str, Vec<&str>> = model
            .hooks
            .hooks()
            .iter()
            .map(|hook| (hook.name(), model.hooks.type_names_for(hook.name())))
            .collect();
        println!("    startup hooks:  {}", serde_json::to_string_pretty(&hooks)?);

        if let Some(registration) = runtime.registration(app.module().id) {
            println!(
                "    registered {} servlet(s), {} filter(s), {} listener(s)",
                registration.descriptor.servlets.len(),
                registration.descriptor.filters.len(),
                registration.descriptor.listeners.len()
            );
        }
    }
    println!();
    Ok(())
}

fn report_and_exit(error: &anyhow::Error) -> ! {
    match error.downcast_ref::<ExtenderError>() {
        Some(e) => {
            tracing::error!(
                "❌ wab-extender failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            std::process::exit(exit_code)
        }
        None => {
            tracing::error!("❌ wab-extender failed: {:#}", error);
            eprintln!("❌ {:#}", error);
            std::process::exit(1)
        }
    }
}
