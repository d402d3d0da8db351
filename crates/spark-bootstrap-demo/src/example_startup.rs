//! 三种装配方式共享的阶段处理器。

use std::sync::Arc;

use spark_bootstrap::{
    HandlerResult, HostStartup,
    logging::ConsoleBackend,
    params::{ConfigurationParam, ConfigurationSourceParam, LoggingParam, RegistrationParam},
};

use crate::example_host::ExampleHostOptions;

pub const OPTIONS_SECTION: &str = "Example";

const DEFAULT_LOG_FILTER: &str = "info";

/// 共享配置文件、环境专属文件、环境变量与命令行，后者优先。
pub fn configure_sources(
    args: Arc<[String]>,
) -> impl Fn(ConfigurationSourceParam<'_>) -> HandlerResult + Send + Sync + 'static {
    move |param: ConfigurationSourceParam<'_>| {
        let environment_file = format!("appsettings.{}.json", param.environment.name());
        param
            .builder
            .set_base_path(param.environment.content_root_path())
            .add_json_file("appsettings.json", true)
            .add_json_file(environment_file, true)
            .add_environment_variables()
            .add_command_line(args.iter().cloned());
        Ok(())
    }
}

pub fn configure_configuration(param: ConfigurationParam<'_>) -> HandlerResult {
    if param.environment.is_development() {
        param
            .configuration
            .set("Example:CacheTimeoutInMs", "1000");
    }
    Ok(())
}

/// 控制台后端只挂接一次，过滤指令取自 `Logging:Filter`。
pub fn configure_logging(param: LoggingParam<'_>) -> HandlerResult {
    let attached = param
        .logger_factory
        .backend_names()
        .iter()
        .any(|name| name == ConsoleBackend::NAME);
    if attached {
        return Ok(());
    }
    let filter = param
        .configuration
        .get("Logging:Filter")
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned());
    param.logger_factory.add_console(&filter)?;
    Ok(())
}

pub fn configure_services(param: RegistrationParam<'_>) -> HandlerResult {
    let options: ExampleHostOptions = param.configuration.bind(OPTIONS_SECTION)?;
    param.services.add_instance(Arc::new(options));
    Ok(())
}

pub fn example_startup(args: Arc<[String]>) -> HostStartup {
    HostStartup::new()
        .with_configuration_sources(configure_sources(args))
        .with_configuration(configure_configuration)
        .with_logging(configure_logging)
        .with_registration(configure_services)
}
