//! Payload decoding for persisted checkpoint blobs.
//!
//! Checkpoint writes and channel blobs arrive as raw bytes tagged with an
//! encoding name. This module turns them into [`serde_json::Value`] trees so
//! the rest of the crate never touches wire formats. Decoding is a pure
//! function: no I/O, no shared state.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// Encoding used when a write row carries no tag of its own.
pub const DEFAULT_WRITE_ENCODING: Encoding = Encoding::StructuredBinary;

/// The three payload encodings the checkpoint runtime persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Compact structured binary (maps/lists/scalars), MessagePack on the wire.
    StructuredBinary,
    /// Legacy arbitrary-object binary serialization. Only the scalar/container
    /// vocabulary is representable; anything else is a decode error.
    ObjectGraph,
    /// UTF-8 text JSON.
    TextJson,
}

impl Encoding {
    /// Resolve an encoding tag, case-insensitively.
    ///
    /// Canonical tags are `structured-binary`, `object-graph`, and
    /// `text-json`; the tags the upstream runtime actually persists
    /// (`msgpack`, `pickle`, `json`) are accepted as aliases.
    pub fn from_tag(tag: &str) -> Result<Self, CodecError> {
        match tag.to_ascii_lowercase().as_str() {
            "structured-binary" | "msgpack" => Ok(Encoding::StructuredBinary),
            "object-graph" | "pickle" => Ok(Encoding::ObjectGraph),
            "text-json" | "json" => Ok(Encoding::TextJson),
            _ => Err(CodecError::UnsupportedEncoding {
                tag: tag.to_string(),
            }),
        }
    }

    /// The canonical tag for this encoding.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Encoding::StructuredBinary => "structured-binary",
            Encoding::ObjectGraph => "object-graph",
            Encoding::TextJson => "text-json",
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CodecError {
    #[error("unsupported encoding tag: {tag}")]
    #[diagnostic(
        code(tracevine::codec::unsupported),
        help("Recognized tags: structured-binary, object-graph, text-json (and their legacy aliases).")
    )]
    UnsupportedEncoding { tag: String },

    #[error("malformed {encoding} payload: {detail}")]
    #[diagnostic(
        code(tracevine::codec::decode),
        help("The blob bytes do not match the named encoding; the row is likely truncated or mis-tagged.")
    )]
    Decode {
        encoding: &'static str,
        detail: String,
    },
}

/// Decode a raw payload tagged with `tag` into a structured value.
///
/// Empty input decodes to [`Value::Null`] regardless of tag — absent payloads
/// are a normal row shape, not an error. Unknown tags fail with
/// [`CodecError::UnsupportedEncoding`]; malformed bytes fail with
/// [`CodecError::Decode`] carrying the underlying cause.
pub fn decode(bytes: &[u8], tag: &str) -> Result<Value, CodecError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    match Encoding::from_tag(tag)? {
        Encoding::StructuredBinary => {
            rmp_serde::from_slice::<Value>(bytes).map_err(|e| CodecError::Decode {
                encoding: Encoding::StructuredBinary.tag(),
                detail: e.to_string(),
            })
        }
        Encoding::ObjectGraph => {
            serde_pickle::from_slice::<Value>(bytes, serde_pickle::DeOptions::new()).map_err(|e| {
                CodecError::Decode {
                    encoding: Encoding::ObjectGraph.tag(),
                    detail: e.to_string(),
                }
            })
        }
        Encoding::TextJson => {
            let text = std::str::from_utf8(bytes).map_err(|e| CodecError::Decode {
                encoding: Encoding::TextJson.tag(),
                detail: e.to_string(),
            })?;
            serde_json::from_str(text).map_err(|e| CodecError::Decode {
                encoding: Encoding::TextJson.tag(),
                detail: e.to_string(),
            })
        }
    }
}

/// Decode a write payload, falling back to [`DEFAULT_WRITE_ENCODING`] when the
/// row has no tag.
pub fn decode_write(bytes: &[u8], tag: Option<&str>) -> Result<Value, CodecError> {
    decode(bytes, tag.unwrap_or(DEFAULT_WRITE_ENCODING.tag()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_is_null_for_every_tag() {
        for tag in ["structured-binary", "object-graph", "text-json"] {
            assert_eq!(decode(b"", tag).unwrap(), Value::Null);
        }
        // Empty input short-circuits even an unknown tag.
        assert_eq!(decode(b"", "protobuf").unwrap(), Value::Null);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode(b"\x01", "protobuf").unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedEncoding { tag } if tag == "protobuf"));
    }

    #[test]
    fn aliases_resolve_to_canonical_encodings() {
        assert_eq!(
            Encoding::from_tag("MSGPACK").unwrap(),
            Encoding::StructuredBinary
        );
        assert_eq!(Encoding::from_tag("pickle").unwrap(), Encoding::ObjectGraph);
        assert_eq!(Encoding::from_tag("json").unwrap(), Encoding::TextJson);
    }

    #[test]
    fn structured_binary_roundtrip() {
        let original = json!({"x": 1, "tags": ["a", "b"], "nested": {"ok": true}});
        let bytes = rmp_serde::to_vec(&original).unwrap();
        assert_eq!(decode(&bytes, "structured-binary").unwrap(), original);
    }

    #[test]
    fn object_graph_roundtrip() {
        let original = json!({"step": 3, "values": [1.5, null, "z"]});
        let bytes = serde_pickle::to_vec(&original, serde_pickle::SerOptions::new()).unwrap();
        assert_eq!(decode(&bytes, "object-graph").unwrap(), original);
    }

    #[test]
    fn text_json_decodes_utf8() {
        assert_eq!(
            decode(br#"{"x": 1}"#, "text-json").unwrap(),
            json!({"x": 1})
        );
    }

    #[test]
    fn truncated_structured_binary_is_a_decode_error() {
        let mut bytes = rmp_serde::to_vec(&json!({"x": [1, 2, 3]})).unwrap();
        bytes.truncate(bytes.len() - 2);
        let err = decode(&bytes, "msgpack").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Decode {
                encoding: "structured-binary",
                ..
            }
        ));
    }

    #[test]
    fn garbage_object_graph_is_a_decode_error() {
        let err = decode(b"\x80\x04not-a-pickle", "pickle").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Decode {
                encoding: "object-graph",
                ..
            }
        ));
    }

    #[test]
    fn invalid_utf8_json_is_a_decode_error() {
        let err = decode(&[0xff, 0xfe, 0x7b], "text-json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn write_decode_defaults_to_structured_binary() {
        let bytes = rmp_serde::to_vec(&json!({"v": 7})).unwrap();
        assert_eq!(decode_write(&bytes, None).unwrap(), json!({"v": 7}));
        assert_eq!(
            decode_write(br#"{"v": 7}"#, Some("text-json")).unwrap(),
            json!({"v": 7})
        );
    }
}
