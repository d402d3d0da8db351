//! 层级配置键工具。
//!
//! 键由若干段组成，段之间以 [`KEY_DELIMITER`] 连接，例如 `environment:name`。
//! 比较时忽略 ASCII 大小写。

/// 键段分隔符。
pub const KEY_DELIMITER: &str = ":";

/// 拼接多个键段，跳过空段。
pub fn combine<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut key = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        if !key.is_empty() {
            key.push_str(KEY_DELIMITER);
        }
        key.push_str(segment);
    }
    key
}

/// 返回键的最后一段。
pub fn section_key(path: &str) -> &str {
    path.rsplit_once(KEY_DELIMITER)
        .map_or(path, |(_, last)| last)
}

/// 返回键的父路径；单段键返回 `None`。
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once(KEY_DELIMITER).map(|(parent, _)| parent)
}

/// 比较用的规范化形式。
pub(crate) fn normalize(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// 若 `key` 位于 `prefix` 之下，返回去掉前缀后的剩余部分。
///
/// 两个参数都应是规范化后的形式；空前缀匹配全部键。
pub(crate) fn strip_section<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(key);
    }
    key.strip_prefix(prefix)?.strip_prefix(KEY_DELIMITER)
}
