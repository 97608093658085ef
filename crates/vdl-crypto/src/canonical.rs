//! Canonical encoding.
//!
//! Every hash and signature in the ledger is computed over the canonical byte
//! form of a value: JSON with object keys sorted by code point, no
//! insignificant whitespace, integers as exact decimal text, and strings as
//! raw UTF-8. Floating-point numbers are rejected wherever they appear,
//! including non-finite values that `serde_json` would otherwise turn into
//! `null`.

use serde::ser::{self, Serialize};
use serde_json::Value;
use vdl_types::Digest;

/// Errors from canonical encoding.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("non-finite number cannot be canonically encoded")]
    NonFiniteNumber,

    #[error("floating-point value {0} is not permitted in canonical form")]
    FloatNotPermitted(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ser::Error for EncodingError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }
}

/// Canonical bytes of `value`.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    value.serialize(FloatProbe)?;
    let tree = serde_json::to_value(value).map_err(|e| EncodingError::Serialization(e.to_string()))?;
    let mut out = Vec::with_capacity(128);
    write_value(&tree, &mut out)?;
    Ok(out)
}

/// Canonical form of `value` as a string.
pub fn canonical_string<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodingError> {
    let bytes = canonical_bytes(value)?;
    String::from_utf8(bytes).map_err(|e| EncodingError::Serialization(e.to_string()))
}

/// BLAKE3 of the canonical bytes, with no domain tag.
///
/// This is the hash used for event hashes, leaf hashes, and policy hashes,
/// so that any external verifier can reproduce it from JSON alone.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<Digest, EncodingError> {
    Ok(Digest::of(&canonical_bytes(value)?))
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), EncodingError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(EncodingError::FloatNotPermitted(n.to_string()));
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_str(s, out)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_str(key, out)?;
                out.push(b':');
                write_value(item, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_str(s: &str, out: &mut Vec<u8>) -> Result<(), EncodingError> {
    serde_json::to_writer(&mut *out, s).map_err(|e| EncodingError::Serialization(e.to_string()))
}

fn reject_float(v: f64) -> Result<(), EncodingError> {
    if v.is_finite() {
        Err(EncodingError::FloatNotPermitted(v.to_string()))
    } else {
        Err(EncodingError::NonFiniteNumber)
    }
}

/// A serializer that produces nothing and fails on the first float it sees.
#[derive(Clone, Copy)]
struct FloatProbe;

type Probe = Result<(), EncodingError>;

impl ser::Serializer for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Probe {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Probe {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Probe {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Probe {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Probe {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Probe {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Probe {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Probe {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Probe {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Probe {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Probe {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Probe {
        reject_float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Probe {
        reject_float(v)
    }
    fn serialize_char(self, _: char) -> Probe {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Probe {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Probe {
        Ok(())
    }
    fn serialize_none(self) -> Probe {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Probe {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Probe {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Probe {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Probe {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _: &'static str, value: &T) -> Probe {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Probe {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self, EncodingError> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> Result<Self, EncodingError> {
        Ok(self)
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, EncodingError> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, EncodingError> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self, EncodingError> {
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, EncodingError> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, EncodingError> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Probe {
        value.serialize(FloatProbe)
    }
    fn end(self) -> Probe {
        Ok(())
    }
}

impl ser::SerializeTuple for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Probe {
        value.serialize(FloatProbe)
    }
    fn end(self) -> Probe {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Probe {
        value.serialize(FloatProbe)
    }
    fn end(self) -> Probe {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Probe {
        value.serialize(FloatProbe)
    }
    fn end(self) -> Probe {
        Ok(())
    }
}

impl ser::SerializeMap for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Probe {
        key.serialize(FloatProbe)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Probe {
        value.serialize(FloatProbe)
    }
    fn end(self) -> Probe {
        Ok(())
    }
}

impl ser::SerializeStruct for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Probe {
        value.serialize(FloatProbe)
    }
    fn end(self) -> Probe {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FloatProbe {
    type Ok = ();
    type Error = EncodingError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Probe {
        value.serialize(FloatProbe)
    }
    fn end(self) -> Probe {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Serialize;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn keys_are_sorted_and_output_is_compact() {
        let value = json!({"b": 1, "a": {"d": [1, 2], "c": null}});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"a":{"c":null,"d":[1,2]},"b":1}"#
        );
    }

    #[test]
    fn struct_field_order_does_not_matter() {
        #[derive(Serialize)]
        struct Forward {
            alpha: i64,
            beta: &'static str,
        }
        #[derive(Serialize)]
        struct Backward {
            beta: &'static str,
            alpha: i64,
        }
        let a = canonical_bytes(&Forward { alpha: 5, beta: "x" }).unwrap();
        let b = canonical_bytes(&Backward { beta: "x", alpha: 5 }).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn integers_are_exact() {
        let value = json!({"big": i64::MAX, "neg": -42});
        assert_eq!(
            canonical_string(&value).unwrap(),
            format!(r#"{{"big":{},"neg":-42}}"#, i64::MAX)
        );
    }

    #[test]
    fn unicode_is_kept_as_utf8() {
        let value = json!({"name": "Café ☕"});
        assert_eq!(canonical_string(&value).unwrap(), r#"{"name":"Café ☕"}"#);
    }

    #[test]
    fn escapes_control_characters() {
        let value = json!({"s": "line\nbreak \"quoted\""});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"s":"line\nbreak \"quoted\""}"#
        );
    }

    #[test]
    fn float_is_rejected() {
        let value = json!({"amount": 19.99});
        assert!(matches!(
            canonical_bytes(&value),
            Err(EncodingError::FloatNotPermitted(_))
        ));
    }

    #[test]
    fn whole_float_is_still_rejected() {
        #[derive(Serialize)]
        struct Price {
            cents: f64,
        }
        assert!(matches!(
            canonical_bytes(&Price { cents: 100.0 }),
            Err(EncodingError::FloatNotPermitted(_))
        ));
    }

    #[test]
    fn non_finite_is_rejected() {
        #[derive(Serialize)]
        struct Ratio {
            value: Option<f64>,
        }
        assert_eq!(
            canonical_bytes(&Ratio { value: Some(f64::NAN) }),
            Err(EncodingError::NonFiniteNumber)
        );
        assert_eq!(
            canonical_bytes(&vec![f32::INFINITY]),
            Err(EncodingError::NonFiniteNumber)
        );
    }

    #[test]
    fn canonical_hash_matches_blake3_of_bytes() {
        let value = json!({"k": "v"});
        let bytes = canonical_bytes(&value).unwrap();
        assert_eq!(canonical_hash(&value).unwrap(), Digest::of(&bytes));
    }

    #[test]
    fn representation_differences_change_bytes() {
        let a = canonical_bytes(&json!({"n": 1})).unwrap();
        let b = canonical_bytes(&json!({"n": "1"})).unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn insertion_order_never_changes_bytes(entries in proptest::collection::vec(("[a-z]{1,6}", any::<i64>()), 0..16)) {
            let forward: HashMap<String, i64> = entries.iter().cloned().collect();
            let mut reversed: HashMap<String, i64> = HashMap::new();
            for (k, _) in entries.iter().rev() {
                reversed.insert(k.clone(), forward[k]);
            }
            let sorted: BTreeMap<String, i64> = forward.clone().into_iter().collect();
            let a = canonical_bytes(&forward).unwrap();
            prop_assert_eq!(&a, &canonical_bytes(&reversed).unwrap());
            prop_assert_eq!(&a, &canonical_bytes(&sorted).unwrap());
        }

        #[test]
        fn encoding_is_deterministic(s in ".*", n in any::<i64>()) {
            let value = json!({"s": s, "n": n, "nested": {"z": [n], "a": s}});
            prop_assert_eq!(canonical_bytes(&value).unwrap(), canonical_bytes(&value).unwrap());
        }

        #[test]
        fn output_parses_back_to_same_value(s in ".*", n in any::<i64>()) {
            let value = json!({"s": s, "n": n});
            let text = canonical_string(&value).unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
