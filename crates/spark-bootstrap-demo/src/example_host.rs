use std::sync::Arc;

use serde::Deserialize;
use spark_bootstrap::{
    BoxError, Cancellation, FromServices, Host, HostingEnvironment, Logger, LoggerFactory,
    ResolutionError, Resolver, ResolverExt, async_trait,
};

/// 绑定自 `Example` 配置节。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ExampleHostOptions {
    pub cache_timeout_in_ms: u64,
}

/// 打印环境与选项后立即退出的宿主。
pub struct ExampleHost {
    environment: Arc<HostingEnvironment>,
    options: Arc<ExampleHostOptions>,
    logger: Logger,
}

impl FromServices for ExampleHost {
    fn from_services(resolver: &dyn Resolver) -> Result<Self, ResolutionError> {
        Ok(Self {
            environment: resolver.get_required::<HostingEnvironment>()?,
            options: resolver.get_required::<ExampleHostOptions>()?,
            logger: resolver
                .get_required::<LoggerFactory>()?
                .create_logger_for::<ExampleHost>(),
        })
    }
}

#[async_trait]
impl Host for ExampleHost {
    async fn run(&self, cancellation: Cancellation) -> Result<(), BoxError> {
        if cancellation.is_cancelled() {
            self.logger.warn("cancelled before start");
            return Ok(());
        }
        self.logger.info(format_args!(
            "environment name: '{}' content root: '{}' cache timeout: {}ms",
            self.environment.name(),
            self.environment.content_root_path().display(),
            self.options.cache_timeout_in_ms
        ));
        Ok(())
    }
}
