//! 配置子系统：有序源集合、解析后的配置快照与强类型绑定。
//!
//! # 模块分工
//! - [`source`]：配置源契约与内存、文件、环境变量、命令行四类实现；
//! - [`ConfigurationBuilder`]：配置源阶段处理器共享的可变源列表；
//! - [`Configuration`]：层叠的键值快照，支持写入、刷新与按节绑定；
//! - [`key`]：`a:b:c` 形式的层级键工具。

mod binder;
mod builder;
pub mod key;
mod root;
pub mod source;

pub use builder::ConfigurationBuilder;
pub use key::KEY_DELIMITER;
pub use root::{Configuration, ConfigurationAccess, ConfigurationSection};
pub use source::{
    CommandLineSource, ConfigurationEntries, ConfigurationSource, EnvironmentVariablesSource,
    JsonFileSource, MemorySource, TomlFileSource,
};
