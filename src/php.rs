//! Reader for the text format produced by PHP's `serialize()`.
//!
//! Only plain data is accepted: nulls, scalars, arrays and objects. Object
//! references and custom serialized classes are rejected, nothing is ever
//! instantiated.

use derive_more::{Display, Error};

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Ordered map, entries kept in source order.
    Array(Vec<(Key, Value)>),
    Object {
        class: String,
        properties: Vec<(Key, Value)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Integer keys match their decimal spelling, the way PHP normalizes them.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Key::Str(s) => s == name,
            Key::Int(i) => name.parse::<i64>().map(|n| n == *i).unwrap_or(false),
        }
    }

    /// Numeric string keys become integers.
    pub fn normalized(name: String) -> Key {
        match name.parse::<i64>() {
            Ok(i) if i.to_string() == name => Key::Int(i),
            _ => Key::Str(name),
        }
    }
}

impl Value {
    pub fn as_array(&self) -> Option<&[(Key, Value)]> {
        match self {
            Value::Array(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up `name` in an array, last duplicate wins.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_array()?
            .iter()
            .rev()
            .find(|(k, _)| k.matches(name))
            .map(|(_, v)| v)
    }

    /// PHP boolean conversion.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Array(entries) => !entries.is_empty(),
            Value::Object { .. } => true,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Key::Int(i as i64), v.into()))
                    .collect(),
            ),
            Json::Object(map) => Value::Array(
                map.into_iter()
                    .map(|(k, v)| (Key::normalized(k), v.into()))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Display, Error, PartialEq)]
#[display("{reason} at byte {position}")]
pub struct DecodeError {
    pub position: usize,
    #[error(ignore)]
    pub reason: String,
}

pub fn from_str(input: &str) -> Result<Value, DecodeError> {
    let mut parser = Parser {
        input: input.as_bytes(),
        pos: 0,
    };
    let value = parser.value(0)?;
    if parser.pos < parser.input.len() {
        log::debug!(
            "Ignoring {} trailing bytes after serialized value",
            parser.input.len() - parser.pos
        );
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError {
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn next(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .input
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, expected: u8) -> Result<(), DecodeError> {
        let found = self.next()?;
        if found == expected {
            Ok(())
        } else {
            self.pos -= 1;
            Err(self.error(format!(
                "expected '{}', found '{}'",
                expected as char, found as char
            )))
        }
    }

    fn until(&mut self, delimiter: u8) -> Result<&'a str, DecodeError> {
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .iter()
            .position(|b| *b == delimiter)
            .ok_or_else(|| self.error(format!("missing '{}'", delimiter as char)))?;
        let token = std::str::from_utf8(&rest[..len]).map_err(|_| self.error("invalid token"))?;
        self.pos += len + 1;
        Ok(token)
    }

    fn int(&mut self, delimiter: u8) -> Result<i64, DecodeError> {
        let start = self.pos;
        let token = self.until(delimiter)?;
        token.parse().map_err(|_| DecodeError {
            position: start,
            reason: format!("invalid integer {token:?}"),
        })
    }

    fn length(&mut self, delimiter: u8) -> Result<usize, DecodeError> {
        let start = self.pos;
        let n = self.int(delimiter)?;
        usize::try_from(n).map_err(|_| DecodeError {
            position: start,
            reason: format!("negative length {n}"),
        })
    }

    fn float(&mut self) -> Result<f64, DecodeError> {
        let start = self.pos;
        let token = self.until(b';')?;
        match token {
            "INF" => Ok(f64::INFINITY),
            "-INF" => Ok(f64::NEG_INFINITY),
            "NAN" => Ok(f64::NAN),
            _ => token.parse().map_err(|_| DecodeError {
                position: start,
                reason: format!("invalid float {token:?}"),
            }),
        }
    }

    /// `len:"bytes"`, length counted in bytes.
    fn quoted(&mut self) -> Result<String, DecodeError> {
        let len = self.length(b':')?;
        self.expect(b'"')?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| self.error("string runs past end of input"))?;
        let s = std::str::from_utf8(&self.input[self.pos..end])
            .map_err(|_| self.error("string is not valid UTF-8"))?
            .to_string();
        self.pos = end;
        self.expect(b'"')?;
        Ok(s)
    }

    fn entries(&mut self, depth: usize) -> Result<Vec<(Key, Value)>, DecodeError> {
        let count = self.length(b':')?;
        self.expect(b'{')?;
        let mut entries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.key()?;
            let value = self.value(depth + 1)?;
            entries.push((key, value));
        }
        self.expect(b'}')?;
        Ok(entries)
    }

    fn key(&mut self) -> Result<Key, DecodeError> {
        let tag = self.next()?;
        self.expect(b':')?;
        match tag {
            b'i' => Ok(Key::Int(self.int(b';')?)),
            b's' => {
                let s = self.quoted()?;
                self.expect(b';')?;
                Ok(Key::Str(s))
            }
            other => {
                self.pos -= 2;
                Err(self.error(format!("invalid array key type '{}'", other as char)))
            }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting is too deep"));
        }
        let tag = self.next()?;
        if tag == b'N' {
            self.expect(b';')?;
            return Ok(Value::Null);
        }
        self.expect(b':')?;
        match tag {
            b'b' => match self.until(b';')? {
                "0" => Ok(Value::Bool(false)),
                "1" => Ok(Value::Bool(true)),
                other => Err(self.error(format!("invalid boolean {other:?}"))),
            },
            b'i' => Ok(Value::Int(self.int(b';')?)),
            b'd' => Ok(Value::Float(self.float()?)),
            b's' => {
                let s = self.quoted()?;
                self.expect(b';')?;
                Ok(Value::String(s))
            }
            b'a' => Ok(Value::Array(self.entries(depth)?)),
            b'O' => {
                let class = self.quoted()?;
                self.expect(b':')?;
                let properties = self.entries(depth)?;
                Ok(Value::Object { class, properties })
            }
            other => {
                self.pos -= 2;
                Err(self.error(format!("unsupported value type '{}'", other as char)))
            }
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn decodes_history_blob() {
        let input = r#"a:2:{s:7:"product";a:1:{s:7:"history";a:2:{i:1700000000;d:9.99;i:1700003600;s:4:"8.49";}}s:10:"variations";a:0:{}}"#;
        let value = from_str(input).unwrap();
        let history = value.get("product").and_then(|p| p.get("history")).unwrap();
        assert_eq!(
            Some(
                &[
                    (Key::Int(1_700_000_000), Value::Float(9.99)),
                    (Key::Int(1_700_003_600), Value::String("8.49".to_string())),
                ][..]
            ),
            history.as_array()
        );
        assert_eq!(Some(&Value::Array(vec![])), value.get("variations"));
    }

    #[test]
    fn counts_string_length_in_bytes() {
        assert_eq!(
            Value::String("café".to_string()),
            from_str(r#"s:5:"café";"#).unwrap()
        );
        assert!(from_str(r#"s:4:"café";"#).is_err());
    }

    #[test]
    fn decodes_scalars() {
        assert_eq!(Value::Null, from_str("N;").unwrap());
        assert_eq!(Value::Bool(true), from_str("b:1;").unwrap());
        assert_eq!(Value::Int(-42), from_str("i:-42;").unwrap());
        assert_eq!(Value::Float(f64::INFINITY), from_str("d:INF;").unwrap());
        assert_eq!(Value::Float(0.5), from_str("d:0.5;").unwrap());
    }

    #[test]
    fn decodes_objects_as_property_lists() {
        let value = from_str(r#"O:8:"stdClass":1:{s:5:"price";d:12.5;}"#).unwrap();
        assert_eq!(
            Value::Object {
                class: "stdClass".to_string(),
                properties: vec![(Key::Str("price".to_string()), Value::Float(12.5))],
            },
            value
        );
    }

    #[test]
    fn rejects_references_and_custom_classes() {
        assert!(from_str("a:2:{i:0;i:1;i:1;R:2;}").is_err());
        assert!(from_str(r#"C:3:"Foo":0:{}"#).is_err());
    }

    #[test]
    fn reports_position_of_truncated_input() {
        let err = from_str("a:1:{i:0;s:3:\"ab").unwrap_err();
        assert_eq!(14, err.position);
    }

    #[test]
    fn limits_nesting_depth() {
        let input = "a:1:{i:0;".repeat(MAX_DEPTH + 2) + "N;" + &"}".repeat(MAX_DEPTH + 2);
        assert!(from_str(&input).is_err());
    }

    #[test]
    fn truthiness_follows_php() {
        assert!(!Value::String("0".to_string()).is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::String("0.0".to_string()).is_truthy());
    }

    #[test]
    fn json_objects_normalize_numeric_keys() {
        let value = Value::from(serde_json::json!({"1700000000": 9.99, "name": "x"}));
        let entries = value.as_array().unwrap();
        assert!(entries.contains(&(Key::Int(1_700_000_000), Value::Float(9.99))));
        assert!(entries.contains(&(Key::Str("name".to_string()), Value::String("x".to_string()))));
    }
}
