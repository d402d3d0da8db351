//! 引导示例：用三种方式装配并运行同一个 [`ExampleHost`]。
//!
//! # 使用方法
//! ```bash
//! SPARK_ENVIRONMENT=Development cargo run -p spark-bootstrap-demo -- --Example:CacheTimeoutInMs=250
//! ```
//! - `SPARK_ENVIRONMENT`：环境名，缺省为 `Production`；`Development` 下缓存超时被覆盖为 1000ms；
//! - 命令行参数以 `--键=值` 形式进入配置，优先级最高；
//! - Ctrl-C 触发取消令牌，宿主在下一次检查时退出。

mod example_host;
mod example_startup;

use std::sync::Arc;

use spark_bootstrap::{
    BootstrapError, Cancellation, HostBuilder, LoggerFactory, ResolutionRoot,
};
use tracing_subscriber::EnvFilter;

use crate::{
    example_host::ExampleHost,
    example_startup::{
        configure_configuration, configure_logging, configure_services, configure_sources,
        example_startup,
    },
};

const ENVIRONMENT_KEY: &str = "SPARK_ENVIRONMENT";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cancellation = Cancellation::new();
    let trigger = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let args: Arc<[String]> = std::env::args().skip(1).collect();
    if let Err(error) = run(args, cancellation).await {
        tracing::error!(%error, "示例运行失败");
        std::process::exit(1);
    }
}

async fn run(args: Arc<[String]>, cancellation: Cancellation) -> Result<(), BootstrapError> {
    hosting_with_builder_methods(&args, cancellation.child()).await?;
    hosting_with_run_host(&args, cancellation.child()).await?;
    hosting_with_startup(args, cancellation).await
}

/// 示例 01：逐个登记处理器，手动构建运行上下文。
async fn hosting_with_builder_methods(
    args: &Arc<[String]>,
    cancellation: Cancellation,
) -> Result<(), BootstrapError> {
    let logger_factory = Arc::new(LoggerFactory::new());
    let logger = logger_factory.create_logger("demo");
    logger.info("example 01: hosting an application using builder methods");

    let mut builder = HostBuilder::from_environment_key(ENVIRONMENT_KEY)?;
    builder
        .use_logger_factory(Arc::clone(&logger_factory))?
        .add_configuration_source_handler(configure_sources(Arc::clone(args)))?
        .add_configuration_handler(configure_configuration)?
        .add_logging_handler(configure_logging)?
        .add_registration_handler(configure_services)?
        .set_resolution_root_factory(|param| {
            let root: Arc<dyn ResolutionRoot> = Arc::new(param.services.build());
            Ok(root)
        })?;

    let mut context = builder.build_run_context::<ExampleHost>()?;
    let outcome = context.run(cancellation).await;
    context.dispose();
    builder.dispose();
    outcome?;

    logger.info("example 01: terminated");
    logger_factory.dispose();
    Ok(())
}

/// 示例 02：登记处理器后由构建器负责构建、运行与释放上下文。
async fn hosting_with_run_host(
    args: &Arc<[String]>,
    cancellation: Cancellation,
) -> Result<(), BootstrapError> {
    let logger_factory = Arc::new(LoggerFactory::new());
    let logger = logger_factory.create_logger("demo");
    logger.info("example 02: hosting an application using run_host");

    let mut builder = HostBuilder::from_environment_key(ENVIRONMENT_KEY)?;
    builder
        .use_logger_factory(Arc::clone(&logger_factory))?
        .add_configuration_source_handler(configure_sources(Arc::clone(args)))?
        .add_configuration_handler(configure_configuration)?
        .add_logging_handler(configure_logging)?
        .add_registration_handler(configure_services)?;

    let outcome = builder.run_host::<ExampleHost>(cancellation).await;
    builder.dispose();
    outcome?;

    logger.info("example 02: terminated");
    logger_factory.dispose();
    Ok(())
}

/// 示例 03：全部处理器集中在启动适配器中。
async fn hosting_with_startup(
    args: Arc<[String]>,
    cancellation: Cancellation,
) -> Result<(), BootstrapError> {
    let logger_factory = Arc::new(LoggerFactory::new());
    let logger = logger_factory.create_logger("demo");
    logger.info("example 03: hosting an application using a startup adapter");

    let mut builder = HostBuilder::from_environment_key(ENVIRONMENT_KEY)?;
    builder
        .use_logger_factory(Arc::clone(&logger_factory))?
        .apply_startup(example_startup(args))?;

    let outcome = builder.run_host::<ExampleHost>(cancellation).await;
    builder.dispose();
    outcome?;

    logger.info("example 03: terminated");
    logger_factory.dispose();
    Ok(())
}
