//! Minimal XML property-list reader.
//!
//! Handles the subset the power sampler and `Info.plist` files emit: `dict`,
//! `array`, `string`, `integer`, `real`, `true`/`false`, `date`, `data`.
//! `data` payloads are kept as their base64 text.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::Event;

#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    Dict(BTreeMap<String, PlistValue>),
    Array(Vec<PlistValue>),
    String(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Date(String),
    Data(String),
}

impl PlistValue {
    /// Dictionary lookup; `None` for missing keys and non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        match self {
            Self::Dict(map) => map.get(key),
            _ => None,
        }
    }

    /// Numeric value of an `integer` or `real`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PlistValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlistError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed property list: {0}")]
    Malformed(String),
    #[error("property list has no root value")]
    Empty,
}

enum Frame {
    Dict {
        map: BTreeMap<String, PlistValue>,
        key: Option<String>,
    },
    Array(Vec<PlistValue>),
}

#[derive(Default)]
struct Builder {
    stack: Vec<Frame>,
    root: Option<PlistValue>,
}

impl Builder {
    fn insert(&mut self, value: PlistValue) -> Result<(), PlistError> {
        match self.stack.last_mut() {
            Some(Frame::Dict { map, key }) => {
                let k = key
                    .take()
                    .ok_or_else(|| PlistError::Malformed("dict value without key".into()))?;
                map.insert(k, value);
            }
            Some(Frame::Array(items)) => items.push(value),
            None => {
                if self.root.is_some() {
                    return Err(PlistError::Malformed("multiple root values".into()));
                }
                self.root = Some(value);
            }
        }
        Ok(())
    }

    fn set_key(&mut self, name: String) -> Result<(), PlistError> {
        match self.stack.last_mut() {
            Some(Frame::Dict { key, .. }) if key.is_none() => {
                *key = Some(name);
                Ok(())
            }
            _ => Err(PlistError::Malformed(format!("unexpected <key>{name}</key>"))),
        }
    }

    fn close(&mut self, tag: &[u8]) -> Result<(), PlistError> {
        let value = match (self.stack.pop(), tag) {
            (Some(Frame::Dict { map, key: None }), b"dict") => PlistValue::Dict(map),
            (Some(Frame::Dict { key: Some(k), .. }), b"dict") => {
                return Err(PlistError::Malformed(format!("key {k} has no value")));
            }
            (Some(Frame::Array(items)), b"array") => PlistValue::Array(items),
            _ => {
                return Err(PlistError::Malformed(format!(
                    "unbalanced </{}>",
                    String::from_utf8_lossy(tag)
                )));
            }
        };
        self.insert(value)
    }

    fn leaf(&mut self, tag: &[u8], text: String) -> Result<(), PlistError> {
        let value = match tag {
            b"key" => return self.set_key(text),
            b"string" => PlistValue::String(text),
            b"integer" => {
                let t = text.trim();
                match t.parse::<i64>() {
                    Ok(v) => PlistValue::Integer(v),
                    Err(_) => PlistValue::Real(
                        t.parse::<f64>()
                            .map_err(|_| PlistError::Malformed(format!("bad integer {t:?}")))?,
                    ),
                }
            }
            b"real" => PlistValue::Real(
                text.trim()
                    .parse()
                    .map_err(|_| PlistError::Malformed(format!("bad real {text:?}")))?,
            ),
            b"date" => PlistValue::Date(text.trim().to_string()),
            b"data" => PlistValue::Data(text.split_whitespace().collect()),
            other => {
                return Err(PlistError::Malformed(format!(
                    "unknown element <{}>",
                    String::from_utf8_lossy(other)
                )));
            }
        };
        self.insert(value)
    }
}

const LEAF_TAGS: &[&[u8]] = &[b"key", b"string", b"integer", b"real", b"date", b"data"];

/// Parse one XML property-list document into its root value.
pub fn parse(text: &str) -> Result<PlistValue, PlistError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut builder = Builder::default();
    // Open leaf element and its accumulated text.
    let mut leaf: Option<(Vec<u8>, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                let tag = name.as_ref();
                if leaf.is_some() {
                    return Err(PlistError::Malformed("element inside scalar".into()));
                }
                match tag {
                    b"plist" => {}
                    b"dict" => builder.stack.push(Frame::Dict {
                        map: BTreeMap::new(),
                        key: None,
                    }),
                    b"array" => builder.stack.push(Frame::Array(Vec::new())),
                    t if LEAF_TAGS.contains(&t) => leaf = Some((t.to_vec(), String::new())),
                    other => {
                        return Err(PlistError::Malformed(format!(
                            "unexpected <{}>",
                            String::from_utf8_lossy(other)
                        )));
                    }
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                match name.as_ref() {
                    b"true" => builder.insert(PlistValue::Bool(true))?,
                    b"false" => builder.insert(PlistValue::Bool(false))?,
                    b"dict" => builder.insert(PlistValue::Dict(BTreeMap::new()))?,
                    b"array" => builder.insert(PlistValue::Array(Vec::new()))?,
                    tag => builder.leaf(tag, String::new())?,
                }
            }
            Event::Text(t) => {
                if let Some((_, buf)) = leaf.as_mut() {
                    buf.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some((_, buf)) = leaf.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => {
                let name = e.name();
                let tag = name.as_ref();
                match leaf.take() {
                    Some((open, text)) if open.as_slice() == tag => builder.leaf(tag, text)?,
                    Some((open, _)) => {
                        return Err(PlistError::Malformed(format!(
                            "</{}> closes <{}>",
                            String::from_utf8_lossy(tag),
                            String::from_utf8_lossy(&open)
                        )));
                    }
                    None if tag == b"plist" => {}
                    None => builder.close(tag)?,
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !builder.stack.is_empty() || leaf.is_some() {
        return Err(PlistError::Malformed("unterminated container".into()));
    }
    builder.root.ok_or(PlistError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n";

    #[test]
    fn parses_nested_document() {
        let text = format!(
            "{HEADER}<plist version=\"1.0\">
<dict>
  <key>name</key><string>E-Cluster</string>
  <key>freq_hz</key><real>1.5e+09</real>
  <key>cpus</key><array><dict><key>cpu</key><integer>0</integer></dict></array>
  <key>ok</key><true/>
  <key>empty</key><string></string>
</dict>
</plist>"
        );
        let root = parse(&text).unwrap();
        assert_eq!(root.get("name").and_then(PlistValue::as_str), Some("E-Cluster"));
        assert_eq!(root.get("freq_hz").and_then(PlistValue::as_f64), Some(1.5e9));
        let cpus = root.get("cpus").and_then(PlistValue::as_array).unwrap();
        assert_eq!(cpus[0].get("cpu").and_then(PlistValue::as_i64), Some(0));
        assert_eq!(root.get("ok").and_then(PlistValue::as_bool), Some(true));
        assert_eq!(root.get("empty").and_then(PlistValue::as_str), Some(""));
    }

    #[test]
    fn unescapes_entities() {
        let root = parse("<plist version=\"1.0\"><dict><key>k</key><string>a &amp; b</string></dict></plist>")
            .unwrap();
        assert_eq!(root.get("k").and_then(PlistValue::as_str), Some("a & b"));
    }

    #[test]
    fn truncated_document_is_an_error() {
        let err = parse("<plist version=\"1.0\"><dict><key>k</key><integer>1</integer>").unwrap_err();
        assert!(matches!(err, PlistError::Malformed(_) | PlistError::Xml(_)));
    }

    #[test]
    fn value_without_key_is_an_error() {
        let err = parse("<plist version=\"1.0\"><dict><integer>1</integer></dict></plist>").unwrap_err();
        assert!(matches!(err, PlistError::Malformed(_)));
    }

    #[test]
    fn empty_document() {
        assert!(matches!(parse("<plist version=\"1.0\"></plist>"), Err(PlistError::Empty)));
    }

    #[test]
    fn bad_number_is_an_error() {
        assert!(parse("<plist version=\"1.0\"><real>abc</real></plist>").is_err());
    }
}
