//! 把扁平键值对绑定到 `serde` 类型。
//!
//! # 教案级注释
//! - **意图 (Why)**：配置值一律是字符串，直接转成 `serde_json::Value` 会丢失“`"5000"` 其实是数字”的信息；
//!   这里实现一个按需解析的 `Deserializer`，由目标类型决定如何解释每个字符串；
//! - **执行逻辑 (How)**：
//!   1. 将 `a:b:c` 形式的键重建为树，同一路径既有值又有子键时子键优先；
//!   2. 结构体字段与键段按忽略大小写匹配；
//!   3. 数组从 `0`、`1`…… 形式的子键按数值顺序读取；
//! - **风险提示 (Trade-offs)**：枚举仅支持单元变体（按名称匹配，忽略大小写）。

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Error as _, IntoDeserializer, MapAccess, SeqAccess,
    Visitor,
    value::{Error, StrDeserializer, StringDeserializer},
};

use super::key::{self, KEY_DELIMITER};

enum Node {
    Value(String),
    /// 规范化段名 → (原始段名, 子节点)。
    Branch(BTreeMap<String, (String, Node)>),
}

impl Node {
    fn insert(&mut self, segments: &[&str], value: String) {
        let Some((head, rest)) = segments.split_first() else {
            if let Node::Value(current) = self {
                *current = value;
            }
            return;
        };
        if let Node::Value(_) = self {
            *self = Node::Branch(BTreeMap::new());
        }
        if let Node::Branch(children) = self {
            let (_, child) = children
                .entry(key::normalize(head))
                .or_insert_with(|| ((*head).to_owned(), Node::Value(String::new())));
            child.insert(rest, value);
        }
    }
}

pub(crate) fn bind<T, I>(entries: I, section: &str) -> Result<T, Error>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = (String, String)>,
{
    let mut root = Node::Branch(BTreeMap::new());
    for (name, value) in entries {
        let segments: Vec<&str> = name.split(KEY_DELIMITER).collect();
        root.insert(&segments, value);
    }
    T::deserialize(NodeDeserializer {
        node: &root,
        path: section.to_owned(),
    })
}

struct NodeDeserializer<'a> {
    node: &'a Node,
    path: String,
}

impl<'a> NodeDeserializer<'a> {
    fn location(&self) -> &str {
        if self.path.is_empty() {
            "<root>"
        } else {
            &self.path
        }
    }

    fn text(&self, expected: &str) -> Result<&str, Error> {
        match self.node {
            Node::Value(text) => Ok(text),
            Node::Branch(_) => Err(Error::custom(format!(
                "expected {expected} at `{}`, found a section",
                self.location()
            ))),
        }
    }

    fn parse<T>(&self, expected: &str) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = self.text(expected)?;
        text.trim().parse().map_err(|error: T::Err| {
            Error::custom(format!(
                "`{text}` at `{}` is not a valid {expected}: {error}",
                self.location()
            ))
        })
    }

    fn child(&self, display: &str, node: &'a Node) -> NodeDeserializer<'a> {
        NodeDeserializer {
            node,
            path: key::combine([self.path.as_str(), display]),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self.node, Node::Value(text) if text.is_empty())
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, Error>
            where
                V: Visitor<'de>,
            {
                visitor.$visit(self.parse::<$ty>(stringify!($ty))?)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for NodeDeserializer<'a> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        let node: &'a Node = self.node;
        match node {
            Node::Value(text) => visitor.visit_string(text.clone()),
            Node::Branch(children) => visitor.visit_map(BranchAccess::new(self, children, None)),
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_i128 => visit_i128(i128),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_u128 => visit_u128(u128),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
        deserialize_char => visit_char(char),
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        let text = self.text("bool")?;
        match text.trim() {
            flag if flag.eq_ignore_ascii_case("true") => visitor.visit_bool(true),
            flag if flag.eq_ignore_ascii_case("false") => visitor.visit_bool(false),
            other => Err(Error::custom(format!(
                "`{other}` at `{}` is not a valid bool",
                self.location()
            ))),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_string(self.text("string")?.to_owned())
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_bytes(self.text("bytes")?.as_bytes())
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_byte_buf(self.text("bytes")?.as_bytes().to_vec())
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        // JSON 中的 null 展开为空串。
        if self.is_blank() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        let node: &'a Node = self.node;
        match node {
            Node::Branch(children) => {
                let mut items = Vec::with_capacity(children.len());
                for (normalized, (display, node)) in children {
                    let index: usize = normalized.parse().map_err(|_| {
                        Error::custom(format!(
                            "expected an indexed sequence at `{}`, found key `{display}`",
                            self.location()
                        ))
                    })?;
                    items.push((index, self.child(display, node)));
                }
                items.sort_by_key(|(index, _)| *index);
                visitor.visit_seq(SequenceAccess {
                    items: items.into_iter().map(|(_, item)| item).collect::<Vec<_>>().into_iter(),
                })
            }
            Node::Value(_) if self.is_blank() => visitor.visit_seq(SequenceAccess {
                items: Vec::new().into_iter(),
            }),
            Node::Value(_) => Err(Error::custom(format!(
                "expected a sequence at `{}`, found a single value",
                self.location()
            ))),
        }
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_branch(None, visitor)
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_branch(Some(fields), visitor)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        let text = self.text("enum variant")?.trim();
        match variants
            .iter()
            .find(|variant| variant.eq_ignore_ascii_case(text))
        {
            Some(variant) => {
                let deserializer: StrDeserializer<'static, Error> = variant.into_deserializer();
                visitor.visit_enum(deserializer)
            }
            None => {
                let deserializer: StringDeserializer<Error> = text.to_owned().into_deserializer();
                visitor.visit_enum(deserializer)
            }
        }
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }
}

impl<'a> NodeDeserializer<'a> {
    fn deserialize_branch<'de, V>(
        self,
        fields: Option<&'static [&'static str]>,
        visitor: V,
    ) -> Result<V::Value, Error>
    where
        V: Visitor<'de>,
    {
        let node: &'a Node = self.node;
        match node {
            Node::Branch(children) => visitor.visit_map(BranchAccess::new(self, children, fields)),
            Node::Value(_) if self.is_blank() => visitor.visit_map(BranchAccess {
                parent_path: self.path,
                entries: Vec::new().into_iter(),
                fields,
                pending: None,
            }),
            Node::Value(_) => Err(Error::custom(format!(
                "expected a section at `{}`, found a single value",
                self.location()
            ))),
        }
    }
}

struct SequenceAccess<'a> {
    items: std::vec::IntoIter<NodeDeserializer<'a>>,
}

impl<'de> SeqAccess<'de> for SequenceAccess<'_> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Error>
    where
        T: DeserializeSeed<'de>,
    {
        self.items
            .next()
            .map(|item| seed.deserialize(item))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct BranchAccess<'a> {
    parent_path: String,
    entries: std::vec::IntoIter<(&'a str, &'a Node)>,
    fields: Option<&'static [&'static str]>,
    pending: Option<(&'a str, &'a Node)>,
}

impl<'a> BranchAccess<'a> {
    fn new(
        parent: NodeDeserializer<'a>,
        children: &'a BTreeMap<String, (String, Node)>,
        fields: Option<&'static [&'static str]>,
    ) -> Self {
        Self {
            parent_path: parent.path,
            entries: children
                .values()
                .map(|(display, node)| (display.as_str(), node))
                .collect::<Vec<_>>()
                .into_iter(),
            fields,
            pending: None,
        }
    }
}

impl<'de> MapAccess<'de> for BranchAccess<'_> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Error>
    where
        K: DeserializeSeed<'de>,
    {
        let Some((display, node)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some((display, node));

        let field = self
            .fields
            .and_then(|fields| fields.iter().find(|field| field.eq_ignore_ascii_case(display)));
        match field {
            Some(field) => {
                let deserializer: StrDeserializer<'static, Error> = field.into_deserializer();
                seed.deserialize(deserializer).map(Some)
            }
            None => {
                let deserializer: StringDeserializer<Error> = display.to_owned().into_deserializer();
                seed.deserialize(deserializer).map(Some)
            }
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Error>
    where
        V: DeserializeSeed<'de>,
    {
        let (display, node) = self
            .pending
            .take()
            .ok_or_else(|| Error::custom("value requested before key"))?;
        seed.deserialize(NodeDeserializer {
            node,
            path: key::combine([self.parent_path.as_str(), display]),
        })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Deserialize;

    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[derive(Debug, Deserialize, PartialEq)]
    enum Mode {
        Fast,
        Safe,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Listener {
        port: u16,
        tls: Option<bool>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Options {
        mode: Mode,
        ratio: f64,
        listeners: Vec<Listener>,
        labels: HashMap<String, String>,
        missing: Option<String>,
    }

    #[test]
    fn strings_are_parsed_by_target_type() {
        let options: Options = bind(
            entries(&[
                ("Mode", "safe"),
                ("Ratio", "0.5"),
                ("Listeners:10", "ignored-by-children"),
                ("Listeners:10:Port", "9090"),
                ("Listeners:2:Port", "8080"),
                ("Listeners:2:Tls", "TRUE"),
                ("Labels:Zone", "eu-1"),
            ]),
            "",
        )
        .expect("合法输入");

        assert_eq!(options.mode, Mode::Safe);
        assert_eq!(options.ratio, 0.5);
        assert_eq!(
            options.listeners,
            vec![
                Listener {
                    port: 8080,
                    tls: Some(true)
                },
                Listener {
                    port: 9090,
                    tls: None
                },
            ]
        );
        assert_eq!(options.labels.get("Zone").map(String::as_str), Some("eu-1"));
        assert_eq!(options.missing, None);
    }

    #[test]
    fn invalid_number_names_the_location() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Port {
            port: u16,
        }

        let error = bind::<Port, _>(entries(&[("Port", "eighty")]), "Server")
            .expect_err("非法端口");
        let message = error.to_string();
        assert!(message.contains("Server:Port"), "错误信息需包含键路径: {message}");
    }
}
