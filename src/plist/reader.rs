//! Strict reader for the plist dialect produced by [`super::writer`].
//!
//! Used to verify generated files and in round-trip tests. It understands the
//! XML prolog, DOCTYPE, comments, entity references and self-closing empty
//! elements; anything else is rejected.

use chrono::{DateTime, Utc};

use super::value::{ConfigNode, Dict};
use crate::error::SerializeError;

/// Parse a complete plist document.
pub fn parse(xml: &str) -> Result<ConfigNode, SerializeError> {
    let mut parser = Parser { src: xml, pos: 0 };
    parser.skip_misc()?;

    let root = parser.read_tag()?;
    if root.name != "plist" || root.kind != TagKind::Open {
        return Err(parser.error(format!("expected <plist>, found <{}>", root.name)));
    }

    parser.skip_misc()?;
    let first = parser.read_tag()?;
    let value = parser.parse_value(first)?;

    parser.skip_misc()?;
    parser.expect_close("plist")?;
    parser.skip_misc()?;
    if parser.pos != parser.src.len() {
        return Err(parser.error("trailing content after </plist>".to_string()));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    Empty,
}

#[derive(Debug)]
struct Tag {
    name: String,
    kind: TagKind,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, reason: String) -> SerializeError {
        SerializeError::Parse {
            offset: self.pos,
            reason,
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), SerializeError> {
        match self.rest().find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => Err(self.error(format!("unterminated construct, expected '{}'", terminator))),
        }
    }

    /// Skip whitespace, processing instructions, comments and the DOCTYPE.
    fn skip_misc(&mut self) -> Result<(), SerializeError> {
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<!DOCTYPE") {
                self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn read_tag(&mut self) -> Result<Tag, SerializeError> {
        if !self.rest().starts_with('<') {
            return Err(self.error("expected an element".to_string()));
        }
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| self.error("unterminated tag".to_string()))?;
        let inner = &self.rest()[1..end];
        self.pos += end + 1;

        let (kind, body) = if let Some(body) = inner.strip_prefix('/') {
            (TagKind::Close, body)
        } else if let Some(body) = inner.strip_suffix('/') {
            (TagKind::Empty, body)
        } else {
            (TagKind::Open, inner)
        };

        let name = body.split_whitespace().next().unwrap_or_default();
        if name.is_empty() {
            return Err(self.error("empty tag name".to_string()));
        }
        Ok(Tag {
            name: name.to_string(),
            kind,
        })
    }

    fn expect_close(&mut self, name: &str) -> Result<(), SerializeError> {
        let tag = self.read_tag()?;
        if tag.kind != TagKind::Close || tag.name != name {
            return Err(self.error(format!("expected </{}>, found <{}>", name, tag.name)));
        }
        Ok(())
    }

    /// Raw character data up to the next tag, unescaped.
    fn read_text(&mut self) -> Result<String, SerializeError> {
        let end = self
            .rest()
            .find('<')
            .ok_or_else(|| self.error("unterminated text".to_string()))?;
        let raw = &self.rest()[..end];
        let start = self.pos;
        self.pos += end;
        unescape(raw).map_err(|reason| SerializeError::Parse {
            offset: start,
            reason,
        })
    }

    /// Text content of a simple element whose open tag was just consumed.
    fn element_text(&mut self, tag: &Tag) -> Result<String, SerializeError> {
        match tag.kind {
            TagKind::Empty => Ok(String::new()),
            TagKind::Open => {
                let text = self.read_text()?;
                self.expect_close(&tag.name)?;
                Ok(text)
            }
            TagKind::Close => Err(self.error(format!("unexpected </{}>", tag.name))),
        }
    }

    fn parse_value(&mut self, tag: Tag) -> Result<ConfigNode, SerializeError> {
        if tag.kind == TagKind::Close {
            return Err(self.error(format!("unexpected </{}>", tag.name)));
        }

        match tag.name.as_str() {
            "dict" => self.parse_dict(tag.kind),
            "array" => self.parse_array(tag.kind),
            "true" | "false" => {
                if tag.kind == TagKind::Open {
                    self.skip_ws();
                    self.expect_close(&tag.name)?;
                }
                Ok(ConfigNode::Bool(tag.name == "true"))
            }
            "integer" => {
                let text = self.element_text(&tag)?;
                text.trim()
                    .parse::<i64>()
                    .map(ConfigNode::Integer)
                    .map_err(|e| self.error(format!("bad integer '{}': {}", text.trim(), e)))
            }
            "real" => {
                let text = self.element_text(&tag)?;
                let value: f64 = text
                    .trim()
                    .parse()
                    .map_err(|e| self.error(format!("bad real '{}': {}", text.trim(), e)))?;
                if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                    Ok(ConfigNode::Integer(value as i64))
                } else {
                    Err(SerializeError::UnsupportedValueKind(format!("real {}", value)))
                }
            }
            "string" => self.element_text(&tag).map(ConfigNode::String),
            "data" => {
                let text = self.element_text(&tag)?;
                Ok(ConfigNode::Data(text.split_whitespace().collect()))
            }
            "date" => {
                let text = self.element_text(&tag)?;
                DateTime::parse_from_rfc3339(text.trim())
                    .map(|at| ConfigNode::Date(at.with_timezone(&Utc)))
                    .map_err(|e| self.error(format!("bad date '{}': {}", text.trim(), e)))
            }
            other => Err(SerializeError::UnsupportedValueKind(other.to_string())),
        }
    }

    fn parse_dict(&mut self, kind: TagKind) -> Result<ConfigNode, SerializeError> {
        let mut dict = Dict::new();
        if kind == TagKind::Empty {
            return Ok(ConfigNode::Dict(dict));
        }
        loop {
            self.skip_misc()?;
            let tag = self.read_tag()?;
            if tag.kind == TagKind::Close && tag.name == "dict" {
                return Ok(ConfigNode::Dict(dict));
            }
            if tag.name != "key" {
                return Err(self.error(format!("expected <key> in dict, found <{}>", tag.name)));
            }
            let key = self.element_text(&tag)?;

            self.skip_misc()?;
            let value_tag = self.read_tag()?;
            let value = self.parse_value(value_tag)?;
            dict.insert(key, value);
        }
    }

    fn parse_array(&mut self, kind: TagKind) -> Result<ConfigNode, SerializeError> {
        let mut items = Vec::new();
        if kind == TagKind::Empty {
            return Ok(ConfigNode::List(items));
        }
        loop {
            self.skip_misc()?;
            let tag = self.read_tag()?;
            if tag.kind == TagKind::Close && tag.name == "array" {
                return Ok(ConfigNode::List(items));
            }
            items.push(self.parse_value(tag)?);
        }
    }
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| format!("unterminated entity in '{}'", raw))?;
        let entity = &after[..semi];
        let decoded = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => decode_char_ref(entity).ok_or_else(|| format!("unknown entity '&{};'", entity))?,
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_char_ref(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
             <plist version=\"1.0\">\n{}\n</plist>\n",
            body
        )
    }

    #[test]
    fn test_parse_nested_document() {
        let xml = wrap(
            "<dict>\n\
             \t<key>Name</key>\n\t<string>A &amp; B &lt;C&gt;</string>\n\
             \t<key>On</key>\n\t<true/>\n\
             \t<key>List</key>\n\t<array>\n\t\t<integer>-7</integer>\n\t\t<false/>\n\t</array>\n\
             \t<key>Blob</key>\n\t<data>\n\tESIz\n\tRFVm\n\t</data>\n\
             </dict>",
        );
        let node = parse(&xml).unwrap();
        assert_eq!(node.pointer("Name").and_then(ConfigNode::as_str), Some("A & B <C>"));
        assert_eq!(node.pointer("On").and_then(ConfigNode::as_bool), Some(true));
        assert_eq!(
            node.pointer("List"),
            Some(&ConfigNode::List(vec![ConfigNode::Integer(-7), ConfigNode::Bool(false)]))
        );
        assert_eq!(node.pointer("Blob"), Some(&ConfigNode::Data("ESIzRFVm".to_string())));
    }

    #[test]
    fn test_real_collapses_to_integer() {
        let node = parse(&wrap("<real>3.0</real>")).unwrap();
        assert_eq!(node, ConfigNode::Integer(3));
    }

    #[test]
    fn test_fractional_real_is_unsupported() {
        let err = parse(&wrap("<real>3.5</real>")).unwrap_err();
        assert!(matches!(err, SerializeError::UnsupportedValueKind(_)));
    }

    #[test]
    fn test_unknown_element_is_unsupported() {
        let err = parse(&wrap("<uid>1</uid>")).unwrap_err();
        assert_eq!(err, SerializeError::UnsupportedValueKind("uid".to_string()));
    }

    #[test]
    fn test_numeric_character_references() {
        let node = parse(&wrap("<string>&#65;&#x42;</string>")).unwrap();
        assert_eq!(node, ConfigNode::String("AB".to_string()));
    }

    #[test]
    fn test_empty_elements() {
        let node = parse(&wrap("<dict><key>s</key><string/><key>a</key><array/></dict>")).unwrap();
        assert_eq!(node.pointer("s"), Some(&ConfigNode::String(String::new())));
        assert_eq!(node.pointer("a"), Some(&ConfigNode::List(Vec::new())));
    }

    #[test]
    fn test_missing_root_is_rejected() {
        assert!(matches!(parse("<dict/>"), Err(SerializeError::Parse { .. })));
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        let xml = format!("{}<dict/>", wrap("<true/>"));
        assert!(matches!(parse(&xml), Err(SerializeError::Parse { .. })));
    }

    #[test]
    fn test_unknown_entity_is_rejected() {
        assert!(parse(&wrap("<string>&nbsp;</string>")).is_err());
    }
}
