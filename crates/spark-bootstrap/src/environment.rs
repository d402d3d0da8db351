//! 宿主环境描述。
//!
//! # 设计缘起（Why）
//! - 流水线的每个阶段都需要知道“当前是哪个环境、应用叫什么、内容根在哪里”，
//!   该模块以不可变值对象承载这些身份信息；
//! - 文件访问能力通过 [`PhysicalFileProvider`] 暴露，处理器据此定位 `appsettings.{env}.json` 等文件。
//!
//! # 契约约束（What）
//! - 构造成功后 `name` 永不为空；
//! - `content_root_file_provider().root()` 与 `content_root_path()` 恒等。

use std::{
    env,
    path::{Component, Path, PathBuf},
};

use crate::error::BootstrapError;

/// 默认读取环境名称的环境变量键。
pub const DEFAULT_ENVIRONMENT_KEY: &str = "environment";

/// 未设置环境变量时采用的环境名称。
pub const DEFAULT_ENVIRONMENT_NAME: &str = "Production";

/// 无法从可执行文件推导应用名时的兜底名称。
pub const DEFAULT_APPLICATION_NAME: &str = "application";

/// 常见环境名称。
pub mod names {
    pub const DEVELOPMENT: &str = "Development";
    pub const STAGING: &str = "Staging";
    pub const PRODUCTION: &str = "Production";
}

/// 内容根下单个文件的解析结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    physical_path: Option<PathBuf>,
    exists: bool,
    is_directory: bool,
}

impl FileInfo {
    fn not_found(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            physical_path: None,
            exists: false,
            is_directory: false,
        }
    }

    /// 请求时使用的相对名称。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 物理路径；当请求的名称逃逸出内容根时为 `None`。
    pub fn physical_path(&self) -> Option<&Path> {
        self.physical_path.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }
}

/// 基于物理目录的文件访问器。
///
/// # 教案级注释
/// - **意图 (Why)**：将“按名称查找内容根下的文件”收敛为单一能力，处理器无需自行拼接路径；
/// - **契约 (What)**：
///   - `root` 非空，构造后不可变；
///   - `file_info` 拒绝绝对路径与 `..` 片段，此类请求返回不存在的 [`FileInfo`]，不会访问内容根之外的文件；
/// - **风险提示 (Trade-offs)**：仅做词法校验，不解析符号链接。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalFileProvider {
    root: PathBuf,
}

impl PhysicalFileProvider {
    /// 以指定目录构造访问器。
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BootstrapError> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(BootstrapError::invalid_argument(
                "content_root_path",
                "content root path must not be empty",
            ));
        }
        Ok(Self { root })
    }

    /// 内容根目录。
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析内容根下的相对文件。
    pub fn file_info(&self, subpath: &str) -> FileInfo {
        let trimmed = subpath.trim_start_matches(['/', '\\']);
        let relative = Path::new(trimmed);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if trimmed.is_empty() || escapes {
            return FileInfo::not_found(subpath);
        }

        let physical_path = self.root.join(relative);
        let metadata = std::fs::metadata(&physical_path).ok();
        FileInfo {
            name: subpath.to_owned(),
            exists: metadata.is_some(),
            is_directory: metadata.is_some_and(|meta| meta.is_dir()),
            physical_path: Some(physical_path),
        }
    }
}

/// 宿主环境描述（Environment Descriptor）。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 以只读值对象携带环境名、应用名与内容根，
///     在 Builder 生命周期内保持不变；
///   - 通过 [`HostingEnvironment::from_process`] 提供“零配置”默认构造，
///     命令行宿主无需手动拼装即可启动。
/// - **契约 (What)**
///   - `name` 非空（全空白同样被拒绝）；
///   - `application_name` 允许为空串，由调用方决定语义；
///   - 内容根访问器的根目录即 `content_root_path`。
/// - **风险提示 (Trade-offs)**
///   - 环境名比较遵循 ASCII 大小写不敏感规则，与配置键的比较规则一致。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostingEnvironment {
    name: String,
    application_name: String,
    content_root: PhysicalFileProvider,
}

impl HostingEnvironment {
    /// 以显式字段构造环境描述。
    pub fn new(
        name: impl Into<String>,
        application_name: impl Into<String>,
        content_root_path: impl Into<PathBuf>,
    ) -> Result<Self, BootstrapError> {
        Self::with_file_provider(
            name,
            application_name,
            PhysicalFileProvider::new(content_root_path)?,
        )
    }

    /// 以现成的文件访问器构造环境描述。
    pub fn with_file_provider(
        name: impl Into<String>,
        application_name: impl Into<String>,
        content_root: PhysicalFileProvider,
    ) -> Result<Self, BootstrapError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BootstrapError::invalid_argument(
                "name",
                "environment name must not be empty",
            ));
        }
        Ok(Self {
            name,
            application_name: application_name.into(),
            content_root,
        })
    }

    /// 从进程环境推导默认描述。
    ///
    /// # 教案式说明
    /// - **执行逻辑 (How)**
    ///   1. 读取环境变量 `name_key`，缺失或为空白时退回 [`DEFAULT_ENVIRONMENT_NAME`]；
    ///   2. 以当前可执行文件名（去扩展名）作为应用名，无法获取时退回 [`DEFAULT_APPLICATION_NAME`]；
    ///   3. 以当前工作目录作为内容根。
    /// - **错误 (What)**：`name_key` 为空返回非法参数；读取工作目录失败返回 IO 错误。
    pub fn from_process(name_key: &str) -> Result<Self, BootstrapError> {
        Self::from_process_with_default(name_key, DEFAULT_ENVIRONMENT_NAME)
    }

    /// 与 [`from_process`](Self::from_process) 相同，但允许自定义兜底环境名。
    pub fn from_process_with_default(
        name_key: &str,
        default_name: &str,
    ) -> Result<Self, BootstrapError> {
        if name_key.trim().is_empty() {
            return Err(BootstrapError::invalid_argument(
                "name_key",
                "environment variable key must not be empty",
            ));
        }

        let name = env::var(name_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default_name.to_owned());
        let content_root = env::current_dir()?;

        Self::new(name, current_application_name(), content_root)
    }

    /// 环境名称，例如 `Production`。
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// 内容根目录。
    pub fn content_root_path(&self) -> &Path {
        self.content_root.root()
    }

    /// 内容根文件访问器。
    pub fn content_root_file_provider(&self) -> &PhysicalFileProvider {
        &self.content_root
    }

    /// 判断当前环境是否为 `environment_name`（大小写不敏感）。
    ///
    /// 空白名称被视为非法参数。
    pub fn is_environment(&self, environment_name: &str) -> Result<bool, BootstrapError> {
        if environment_name.trim().is_empty() {
            return Err(BootstrapError::invalid_argument(
                "environment_name",
                "environment name must not be empty or whitespace",
            ));
        }
        Ok(self.name.eq_ignore_ascii_case(environment_name))
    }

    pub fn is_development(&self) -> bool {
        self.name.eq_ignore_ascii_case(names::DEVELOPMENT)
    }

    pub fn is_staging(&self) -> bool {
        self.name.eq_ignore_ascii_case(names::STAGING)
    }

    pub fn is_production(&self) -> bool {
        self.name.eq_ignore_ascii_case(names::PRODUCTION)
    }
}

fn current_application_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|path| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_rejected() {
        let error = HostingEnvironment::new("  ", "app", "/srv/app").expect_err("空白环境名必须被拒绝");
        assert!(matches!(
            error,
            BootstrapError::InvalidArgument { argument: "name", .. }
        ));
    }

    #[test]
    fn empty_content_root_is_rejected() {
        let error = HostingEnvironment::new("Production", "app", "").expect_err("空内容根必须被拒绝");
        assert!(matches!(
            error,
            BootstrapError::InvalidArgument {
                argument: "content_root_path",
                ..
            }
        ));
    }

    #[test]
    fn accessor_root_matches_content_root_path() {
        let env = HostingEnvironment::new("Staging", "app", "/srv/app").expect("合法输入");
        assert_eq!(env.content_root_file_provider().root(), env.content_root_path());
        assert!(env.is_staging());
        assert!(!env.is_production());
    }

    #[test]
    fn environment_predicates_ignore_case() {
        let env = HostingEnvironment::new("development", "app", "/srv/app").expect("合法输入");
        assert!(env.is_development());
        assert!(env.is_environment("DEVELOPMENT").expect("非空名称"));
        assert!(env.is_environment(" ").is_err());
    }

    #[test]
    fn file_info_stays_inside_root() {
        let dir = tempfile::tempdir().expect("临时目录");
        std::fs::write(dir.path().join("appsettings.json"), "{}").expect("写入文件");
        let provider = PhysicalFileProvider::new(dir.path()).expect("合法根目录");

        let found = provider.file_info("appsettings.json");
        assert!(found.exists());
        assert_eq!(
            found.physical_path(),
            Some(dir.path().join("appsettings.json").as_path())
        );

        let missing = provider.file_info("nlog.config");
        assert!(!missing.exists());
        assert!(missing.physical_path().is_some());

        let escaped = provider.file_info("../etc/passwd");
        assert!(!escaped.exists());
        assert!(escaped.physical_path().is_none());
    }

    #[test]
    fn process_default_falls_back_to_production() {
        let env = HostingEnvironment::from_process("SPARK_BOOTSTRAP_UNSET_ENVIRONMENT_KEY")
            .expect("默认构造不应失败");
        assert_eq!(env.name(), DEFAULT_ENVIRONMENT_NAME);
        assert!(!env.application_name().is_empty());
        assert_eq!(
            env.content_root_path(),
            std::env::current_dir().expect("工作目录").as_path()
        );
    }
}
