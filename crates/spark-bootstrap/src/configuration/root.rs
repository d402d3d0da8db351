use std::{
    collections::BTreeMap,
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use crate::error::ConfigurationError;

use super::{
    binder,
    key::{self, KEY_DELIMITER},
    source::ConfigurationSource,
};

/// 已解析配置的抽象读写能力。
///
/// 构建器在注册阶段同时以具体类型 `Arc<Configuration>` 与 `Arc<dyn ConfigurationAccess>`
/// 两种形式登记解析后的配置，业务代码可只依赖该抽象。
pub trait ConfigurationAccess: Send + Sync + 'static {
    /// 读取键值，忽略大小写。
    fn get(&self, key: &str) -> Option<String>;

    /// 写入键值。
    fn set(&self, key: &str, value: &str);

    /// 列出 `key` 下的直接子段名称。
    fn children(&self, key: &str) -> Vec<String>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// 规范化键 → (原始键, 值)。
type LayerData = BTreeMap<String, (String, String)>;

struct Layer {
    source: Option<Arc<dyn ConfigurationSource>>,
    data: LayerData,
}

impl Layer {
    fn load(
        source: Arc<dyn ConfigurationSource>,
        base_path: Option<&std::path::Path>,
    ) -> Result<Self, ConfigurationError> {
        let mut data = LayerData::new();
        for (name, value) in source.load(base_path)? {
            data.insert(key::normalize(&name), (name, value));
        }
        Ok(Self {
            source: Some(source),
            data,
        })
    }
}

struct Layers {
    base_path: Option<PathBuf>,
    layers: Vec<Layer>,
}

/// 解析后的配置快照（Resolved Configuration）。
///
/// # 教案级注释
/// - **意图 (Why)**
///   - 每个配置源对应一层键值表，读取时从最后一层向前查找，实现“后注册者优先”；
///   - 配置值处理器可以通过 [`set`](Self::set) 注入或覆盖值，例如仅在开发环境生效的覆盖项。
/// - **体系位置 (Where)**
///   - 由 [`ConfigurationBuilder::build`](super::ConfigurationBuilder::build) 产出，
///     构建器将其包装为 `Arc` 后传入日志、注册与后解析阶段。
/// - **执行逻辑 (How)**
///   - 内部以 `parking_lot::RwLock` 保护层列表，读多写少；
///   - `set` 写入每一层，保证任何层都不会遮蔽新值；没有任何源时写入隐式的覆盖层；
///   - [`reload`](Self::reload) 重新读取所有源并整体替换层列表，之前 `set` 的值随之丢失。
/// - **契约 (What)**
///   - 键比较忽略 ASCII 大小写，`keys`/`children` 返回首次出现时的原始大小写；
///   - `reload` 失败时保持旧快照不变。
pub struct Configuration {
    inner: RwLock<Layers>,
}

impl Configuration {
    pub(crate) fn load(
        sources: Vec<Arc<dyn ConfigurationSource>>,
        base_path: Option<PathBuf>,
    ) -> Result<Self, ConfigurationError> {
        let layers = load_layers(&sources, base_path.as_deref())?;
        Ok(Self {
            inner: RwLock::new(Layers { base_path, layers }),
        })
    }

    /// 不含任何源的空配置。
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(Layers {
                base_path: None,
                layers: Vec::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let normalized = key::normalize(key);
        let inner = self.inner.read();
        inner
            .layers
            .iter()
            .rev()
            .find_map(|layer| layer.data.get(&normalized))
            .map(|(_, value)| value.clone())
    }

    /// 写入键值。
    pub fn set(&self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let normalized = key::normalize(key);
        let mut inner = self.inner.write();
        if inner.layers.is_empty() {
            inner.layers.push(Layer {
                source: None,
                data: LayerData::new(),
            });
        }
        for layer in &mut inner.layers {
            layer
                .data
                .insert(normalized.clone(), (key.to_owned(), value.clone()));
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 所有键（去重后按规范化形式排序）。
    pub fn keys(&self) -> Vec<String> {
        self.merged().into_values().map(|(name, _)| name).collect()
    }

    /// 合并后的全部键值对。
    pub fn entries(&self) -> Vec<(String, String)> {
        self.merged().into_values().collect()
    }

    /// 列出 `parent` 下的直接子段，空串表示根。
    pub fn children(&self, parent: &str) -> Vec<String> {
        let prefix = key::normalize(parent);
        let mut children = BTreeMap::new();
        for (normalized, (original, _)) in self.merged() {
            let Some(rest) = key::strip_section(&normalized, &prefix) else {
                continue;
            };
            // 规范化只改变 ASCII 大小写，字节长度不变。
            let rest_original = &original[original.len() - rest.len()..];
            let segment = rest_original
                .split(KEY_DELIMITER)
                .next()
                .unwrap_or(rest_original);
            children
                .entry(key::normalize(segment))
                .or_insert_with(|| segment.to_owned());
        }
        children.into_values().collect()
    }

    /// 以 `path` 为根的配置节视图。
    pub fn section(&self, path: &str) -> ConfigurationSection<'_> {
        ConfigurationSection {
            root: self,
            path: path.to_owned(),
        }
    }

    /// 读取并解析单值；键缺失时返回 `Ok(None)`。
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigurationError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|error: T::Err| ConfigurationError::Parse {
                key: key.to_owned(),
                value,
                reason: error.to_string(),
            })
    }

    /// 将 `section` 下的键值绑定为强类型对象，空串表示整个配置。
    ///
    /// 字段名与键段的匹配忽略大小写；数值、布尔值从字符串解析。
    pub fn bind<T>(&self, section: &str) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        let prefix = key::normalize(section);
        let entries = self
            .merged()
            .into_iter()
            .filter_map(|(normalized, (original, value))| {
                let rest = key::strip_section(&normalized, &prefix)?;
                Some((original[original.len() - rest.len()..].to_owned(), value))
            });
        binder::bind(entries, section).map_err(|source| ConfigurationError::Bind {
            section: section.to_owned(),
            source,
        })
    }

    /// 重新读取所有源并替换快照。
    pub fn reload(&self) -> Result<(), ConfigurationError> {
        let (sources, base_path) = {
            let inner = self.inner.read();
            let sources: Vec<_> = inner
                .layers
                .iter()
                .filter_map(|layer| layer.source.clone())
                .collect();
            (sources, inner.base_path.clone())
        };
        let layers = load_layers(&sources, base_path.as_deref())?;
        self.inner.write().layers = layers;
        Ok(())
    }

    /// 参与快照的源名称，顺序即优先级。
    pub fn source_names(&self) -> Vec<String> {
        self.inner
            .read()
            .layers
            .iter()
            .filter_map(|layer| layer.source.as_ref())
            .map(|source| source.name().into_owned())
            .collect()
    }

    fn merged(&self) -> LayerData {
        let inner = self.inner.read();
        let mut merged = LayerData::new();
        for layer in &inner.layers {
            for (normalized, (original, value)) in &layer.data {
                merged
                    .entry(normalized.clone())
                    .and_modify(|(_, current)| current.clone_from(value))
                    .or_insert_with(|| (original.clone(), value.clone()));
            }
        }
        merged
    }
}

impl ConfigurationAccess for Configuration {
    fn get(&self, key: &str) -> Option<String> {
        Configuration::get(self, key)
    }

    fn set(&self, key: &str, value: &str) {
        Configuration::set(self, key, value);
    }

    fn children(&self, key: &str) -> Vec<String> {
        Configuration::children(self, key)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("sources", &self.source_names())
            .field("keys", &self.keys().len())
            .finish()
    }
}

fn load_layers(
    sources: &[Arc<dyn ConfigurationSource>],
    base_path: Option<&std::path::Path>,
) -> Result<Vec<Layer>, ConfigurationError> {
    sources
        .iter()
        .map(|source| Layer::load(Arc::clone(source), base_path))
        .collect()
}

/// 配置节视图，借用所属的 [`Configuration`]。
#[derive(Clone)]
pub struct ConfigurationSection<'a> {
    root: &'a Configuration,
    path: String,
}

impl<'a> ConfigurationSection<'a> {
    /// 完整路径。
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 路径的最后一段。
    pub fn key(&self) -> &str {
        key::section_key(&self.path)
    }

    /// 节自身的值。
    pub fn value(&self) -> Option<String> {
        self.root.get(&self.path)
    }

    pub fn get(&self, relative: &str) -> Option<String> {
        self.root.get(&key::combine([self.path.as_str(), relative]))
    }

    pub fn set(&self, relative: &str, value: impl Into<String>) {
        self.root
            .set(&key::combine([self.path.as_str(), relative]), value);
    }

    pub fn section(&self, relative: &str) -> ConfigurationSection<'a> {
        self.root.section(&key::combine([self.path.as_str(), relative]))
    }

    /// 直接子节。
    pub fn children(&self) -> Vec<ConfigurationSection<'a>> {
        self.root
            .children(&self.path)
            .into_iter()
            .map(|child| self.section(&child))
            .collect()
    }

    /// 节自身有值或拥有子键时视为存在。
    pub fn exists(&self) -> bool {
        self.value().is_some() || !self.root.children(&self.path).is_empty()
    }

    pub fn bind<T>(&self) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        self.root.bind(&self.path)
    }
}

impl fmt::Debug for ConfigurationSection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationSection")
            .field("path", &self.path)
            .field("value", &self.value())
            .finish()
    }
}
