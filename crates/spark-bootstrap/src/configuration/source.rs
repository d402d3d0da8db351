//! 配置源契约与内置实现。
//!
//! # 教案级注释
//! - **意图 (Why)**：把“从某处读出一组键值对”抽象为 [`ConfigurationSource`]，
//!   使 [`ConfigurationBuilder`](super::ConfigurationBuilder) 只关心源的顺序，不关心来源格式；
//! - **契约 (What)**：
//!   - `load` 每次调用都重新读取，返回展开后的 `(键, 值)` 列表；同一源内后出现的键覆盖先出现的键；
//!   - 结构化文档（JSON/TOML）的对象展开为 `a:b:c`，数组按下标展开为 `a:0`，`null` 展开为空串；
//! - **风险提示 (Trade-offs)**：文件源在 `build`/`reload` 时同步读盘，不做变更监听。

use std::{
    borrow::Cow,
    env, fmt, fs,
    path::{Path, PathBuf},
};

use crate::error::ConfigurationError;

use super::key::{self, KEY_DELIMITER};

/// 展开后的键值对列表。
pub type ConfigurationEntries = Vec<(String, String)>;

/// 单个配置源。
pub trait ConfigurationSource: Send + Sync + 'static {
    /// 源名称，用于按名称移除或诊断输出。
    fn name(&self) -> Cow<'_, str>;

    /// 读取并展开全部键值对。
    ///
    /// `base_path` 为构建器设置的基准目录，文件类源以此解析相对路径。
    fn load(&self, base_path: Option<&Path>) -> Result<ConfigurationEntries, ConfigurationError>;
}

impl fmt::Debug for dyn ConfigurationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigurationSource")
            .field(&self.name())
            .finish()
    }
}

/// 内存键值源。
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    name: String,
    entries: ConfigurationEntries,
}

impl MemorySource {
    pub const DEFAULT_NAME: &'static str = "memory";

    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::named(Self::DEFAULT_NAME, entries)
    }

    /// 以自定义名称构造内存源。
    pub fn named<I, K, V>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl ConfigurationSource for MemorySource {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn load(&self, _base_path: Option<&Path>) -> Result<ConfigurationEntries, ConfigurationError> {
        Ok(self.entries.clone())
    }
}

/// JSON 文件源。
#[derive(Clone, Debug)]
pub struct JsonFileSource {
    path: PathBuf,
    optional: bool,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>, optional: bool) -> Self {
        Self {
            path: path.into(),
            optional,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationSource for JsonFileSource {
    fn name(&self) -> Cow<'_, str> {
        self.path.to_string_lossy()
    }

    fn load(&self, base_path: Option<&Path>) -> Result<ConfigurationEntries, ConfigurationError> {
        let Some((path, content)) = read_document(&self.path, self.optional, base_path)? else {
            return Ok(Vec::new());
        };
        let document: serde_json::Value = serde_json::from_str(&content)
            .map_err(|source| ConfigurationError::Json {
                path: path.clone(),
                source,
            })?;
        let serde_json::Value::Object(_) = document else {
            return Err(ConfigurationError::InvalidDocument {
                path,
                reason: "top-level value must be an object".to_owned(),
            });
        };

        let mut entries = Vec::new();
        flatten_json(&mut entries, String::new(), &document);
        Ok(entries)
    }
}

/// TOML 文件源。
#[derive(Clone, Debug)]
pub struct TomlFileSource {
    path: PathBuf,
    optional: bool,
}

impl TomlFileSource {
    pub fn new(path: impl Into<PathBuf>, optional: bool) -> Self {
        Self {
            path: path.into(),
            optional,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigurationSource for TomlFileSource {
    fn name(&self) -> Cow<'_, str> {
        self.path.to_string_lossy()
    }

    fn load(&self, base_path: Option<&Path>) -> Result<ConfigurationEntries, ConfigurationError> {
        let Some((path, content)) = read_document(&self.path, self.optional, base_path)? else {
            return Ok(Vec::new());
        };
        let table: toml::Table =
            toml::from_str(&content).map_err(|source| ConfigurationError::Toml {
                path: path.clone(),
                source,
            })?;

        let mut entries = Vec::new();
        for (name, value) in &table {
            flatten_toml(&mut entries, name.clone(), value);
        }
        Ok(entries)
    }
}

/// 进程环境变量源。
///
/// - 设置前缀时只保留以该前缀开头（忽略大小写）的变量，并去除前缀；
/// - 变量名中的 `__` 映射为键分隔符 `:`，便于在不支持冒号的 shell 中表达层级。
#[derive(Clone, Debug, Default)]
pub struct EnvironmentVariablesSource {
    prefix: Option<String>,
}

impl EnvironmentVariablesSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()).filter(|prefix| !prefix.is_empty()),
        }
    }

    /// 对给定变量集合执行与 `load` 相同的过滤与映射。
    pub fn filter<I>(&self, variables: I) -> ConfigurationEntries
    where
        I: IntoIterator<Item = (String, String)>,
    {
        variables
            .into_iter()
            .filter_map(|(name, value)| {
                let stripped = match &self.prefix {
                    Some(prefix) => strip_prefix_ignore_case(&name, prefix)?,
                    None => name.as_str(),
                };
                if stripped.is_empty() {
                    return None;
                }
                Some((stripped.replace("__", KEY_DELIMITER), value))
            })
            .collect()
    }
}

impl ConfigurationSource for EnvironmentVariablesSource {
    fn name(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("environment-variables({prefix})")),
            None => Cow::Borrowed("environment-variables"),
        }
    }

    fn load(&self, _base_path: Option<&Path>) -> Result<ConfigurationEntries, ConfigurationError> {
        // 非 UTF-8 的变量无法作为配置键值，直接跳过。
        let variables = env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        });
        Ok(self.filter(variables))
    }
}

/// 命令行参数源。
///
/// 支持 `--key=value`、`--key value`、`/key=value`、`/key value` 与 `key=value`；
/// 无前缀且不含 `=` 的参数被忽略。
#[derive(Clone, Debug, Default)]
pub struct CommandLineSource {
    args: Vec<String>,
}

impl CommandLineSource {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigurationSource for CommandLineSource {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("command-line")
    }

    fn load(&self, _base_path: Option<&Path>) -> Result<ConfigurationEntries, ConfigurationError> {
        let mut entries = Vec::new();
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            let (prefixed, body) = if let Some(body) = arg.strip_prefix("--") {
                (true, body)
            } else if let Some(body) = arg.strip_prefix('/').or_else(|| arg.strip_prefix('-')) {
                (true, body)
            } else {
                (false, arg.as_str())
            };

            match body.split_once('=') {
                Some((name, value)) if !name.is_empty() => {
                    entries.push((name.to_owned(), value.to_owned()));
                }
                Some(_) => {
                    return Err(ConfigurationError::InvalidCommandLine {
                        argument: arg.clone(),
                    });
                }
                None if !prefixed => {}
                None => {
                    let value = args.next().ok_or_else(|| {
                        ConfigurationError::InvalidCommandLine {
                            argument: arg.clone(),
                        }
                    })?;
                    entries.push((body.to_owned(), value.clone()));
                }
            }
        }
        Ok(entries)
    }
}

fn read_document(
    path: &Path,
    optional: bool,
    base_path: Option<&Path>,
) -> Result<Option<(PathBuf, String)>, ConfigurationError> {
    let resolved = match base_path {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    };
    match fs::read_to_string(&resolved) {
        Ok(content) => Ok(Some((resolved, content))),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            if optional {
                Ok(None)
            } else {
                Err(ConfigurationError::MissingFile { path: resolved })
            }
        }
        Err(source) => Err(ConfigurationError::Io {
            path: resolved,
            source,
        }),
    }
}

fn flatten_json(entries: &mut ConfigurationEntries, prefix: String, value: &serde_json::Value) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            for (name, child) in map {
                flatten_json(entries, key::combine([prefix.as_str(), name.as_str()]), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_json(entries, key::combine([prefix.clone(), index.to_string()]), child);
            }
        }
        Value::Null => entries.push((prefix, String::new())),
        Value::String(text) => entries.push((prefix, text.clone())),
        Value::Bool(flag) => entries.push((prefix, flag.to_string())),
        Value::Number(number) => entries.push((prefix, number.to_string())),
    }
}

fn flatten_toml(entries: &mut ConfigurationEntries, prefix: String, value: &toml::Value) {
    use toml::Value;

    match value {
        Value::Table(table) => {
            for (name, child) in table {
                flatten_toml(entries, key::combine([prefix.as_str(), name.as_str()]), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_toml(entries, key::combine([prefix.clone(), index.to_string()]), child);
            }
        }
        Value::String(text) => entries.push((prefix, text.clone())),
        Value::Integer(number) => entries.push((prefix, number.to_string())),
        Value::Float(number) => entries.push((prefix, number.to_string())),
        Value::Boolean(flag) => entries.push((prefix, flag.to_string())),
        Value::Datetime(datetime) => entries.push((prefix, datetime.to_string())),
    }
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &name[prefix.len()..])
}
