use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::ConfigurationError;

use super::{
    Configuration,
    source::{
        CommandLineSource, ConfigurationSource, EnvironmentVariablesSource, JsonFileSource,
        MemorySource, TomlFileSource,
    },
};

/// 有序、可变的配置源集合。
///
/// # 教案级注释
/// - **意图 (Why)**：配置源阶段的处理器共享同一个构建器，按注册顺序追加、移除或重排源；
///   最终由 [`build`](Self::build) 物化为 [`Configuration`]；
/// - **契约 (What)**：
///   - 源的顺序即优先级，越靠后的源在读取同名键时越优先；
///   - 文件类源的相对路径以 [`set_base_path`](Self::set_base_path) 设置的目录为基准，未设置时相对进程工作目录；
/// - **风险提示 (Trade-offs)**：`build` 会同步读取所有文件源，处理器中不应放置耗时源。
#[derive(Clone, Default)]
pub struct ConfigurationBuilder {
    sources: Vec<Arc<dyn ConfigurationSource>>,
    base_path: Option<PathBuf>,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加任意配置源。
    pub fn add<S>(&mut self, source: S) -> &mut Self
    where
        S: ConfigurationSource,
    {
        self.sources.push(Arc::new(source));
        self
    }

    /// 追加已共享的配置源。
    pub fn add_shared(&mut self, source: Arc<dyn ConfigurationSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    /// 追加内存键值源。
    pub fn add_in_memory<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.add(MemorySource::new(entries))
    }

    pub fn add_json_file(&mut self, path: impl Into<PathBuf>, optional: bool) -> &mut Self {
        self.add(JsonFileSource::new(path, optional))
    }

    pub fn add_toml_file(&mut self, path: impl Into<PathBuf>, optional: bool) -> &mut Self {
        self.add(TomlFileSource::new(path, optional))
    }

    /// 追加不带前缀的环境变量源。
    pub fn add_environment_variables(&mut self) -> &mut Self {
        self.add(EnvironmentVariablesSource::new())
    }

    /// 追加带前缀的环境变量源，前缀在展开时被剥离。
    pub fn add_prefixed_environment_variables(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.add(EnvironmentVariablesSource::with_prefix(prefix))
    }

    pub fn add_command_line<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(CommandLineSource::new(args))
    }

    /// 设置文件类源的基准目录。
    pub fn set_base_path(&mut self, base_path: impl Into<PathBuf>) -> &mut Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// 当前源列表，顺序即优先级。
    pub fn sources(&self) -> &[Arc<dyn ConfigurationSource>] {
        &self.sources
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|source| source.name().into_owned())
            .collect()
    }

    /// 移除所有名为 `name` 的源，返回移除数量。
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.sources.len();
        self.sources.retain(|source| source.name() != name);
        before - self.sources.len()
    }

    /// 在指定位置插入源；`index` 超出长度时追加到末尾。
    pub fn insert<S>(&mut self, index: usize, source: S) -> &mut Self
    where
        S: ConfigurationSource,
    {
        let index = index.min(self.sources.len());
        self.sources.insert(index, Arc::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// 按顺序加载所有源并生成配置快照。
    pub fn build(&self) -> Result<Configuration, ConfigurationError> {
        Configuration::load(self.sources.clone(), self.base_path.clone())
    }
}

impl fmt::Debug for ConfigurationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationBuilder")
            .field("sources", &self.source_names())
            .field("base_path", &self.base_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_sources_take_precedence() {
        let mut builder = ConfigurationBuilder::new();
        builder
            .add_in_memory([("Greeting", "hello")])
            .add_command_line(["--greeting=hi"]);

        let configuration = builder.build().expect("内存源不会失败");
        assert_eq!(configuration.get("GREETING").as_deref(), Some("hi"));
    }

    #[test]
    fn sources_can_be_removed_and_inserted() {
        let mut builder = ConfigurationBuilder::new();
        builder
            .add(MemorySource::named("defaults", [("a", "1")]))
            .add_command_line(["--a=2"]);
        assert_eq!(builder.source_names(), ["defaults", "command-line"]);

        assert_eq!(builder.remove("command-line"), 1);
        builder.insert(0, MemorySource::named("first", [("a", "0")]));
        builder.insert(99, MemorySource::named("last", [("b", "1")]));
        assert_eq!(builder.source_names(), ["first", "defaults", "last"]);
        assert_eq!(builder.len(), 3);

        let configuration = builder.build().expect("内存源不会失败");
        assert_eq!(configuration.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn base_path_resolves_relative_files() {
        let dir = tempfile::tempdir().expect("临时目录");
        std::fs::write(dir.path().join("appsettings.json"), r#"{"Name":"demo"}"#)
            .expect("写入 JSON");

        let mut builder = ConfigurationBuilder::new();
        builder
            .set_base_path(dir.path())
            .add_json_file("appsettings.json", false);
        let configuration = builder.build().expect("文件存在");
        assert_eq!(configuration.get("name").as_deref(), Some("demo"));
    }
}
