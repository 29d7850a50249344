//! State envelope encoding and decoding
//!
//! An envelope is one MessagePack map: the caller's fields, each tensor
//! replaced by `{shape, dtype, data}`, plus the sentinel entry
//! `"HeLlO": "wOrLd"`. The sentinel is a format marker, not an integrity
//! check; it only tells our own envelopes apart from arbitrary bytes.

use crate::error::{CodecError, CodecResult};
use crate::wire::{DecodedValue, EnvelopeRef, TENSOR_DATA, TENSOR_DTYPE, TENSOR_SHAPE};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::trace;
use types::{DType, StateMessage, Tensor, Value, SENTINEL_KEY, SENTINEL_VALUE};

/// Serialize a message into an envelope
///
/// No size ceiling is applied here; the relay worker enforces it.
pub fn encode(message: &StateMessage) -> CodecResult<Vec<u8>> {
    rmp_serde::to_vec(&EnvelopeRef(message)).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })
}

/// Decode an envelope, returning `None` for anything that is not one of ours
pub fn decode(bytes: &[u8]) -> Option<StateMessage> {
    decode_checked(bytes).ok()
}

/// Decode an envelope, reporting why it was rejected
///
/// Tensor sub-maps that fail reconstruction are kept as raw
/// [`Value::Map`]s; only format and sentinel failures reject the envelope.
pub fn decode_checked(bytes: &[u8]) -> CodecResult<StateMessage> {
    let mut deserializer = rmp_serde::Deserializer::new(Cursor::new(bytes));
    let DecodedValue(root) = DecodedValue::deserialize(&mut deserializer)
        .map_err(|e| CodecError::malformed(e.to_string()))?;

    let consumed = usize::try_from(deserializer.get_ref().position()).unwrap_or(usize::MAX);
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            total: bytes.len(),
        });
    }

    let mut fields = match root {
        Value::Map(fields) => fields,
        other => return Err(CodecError::NotAMap { kind: other.kind() }),
    };

    match fields.remove(SENTINEL_KEY) {
        Some(Value::Str(ref s)) if s == SENTINEL_VALUE => {}
        Some(other) => {
            return Err(CodecError::SentinelMismatch {
                found: format!("{other:?}").chars().take(64).collect(),
            })
        }
        None => return Err(CodecError::MissingSentinel),
    }

    let fields = fields
        .into_iter()
        .map(|(key, value)| (key, revive_tensors(value)))
        .collect();

    // The sentinel entry was removed above, so the reserved key is absent
    Ok(StateMessage::from_fields_unchecked(fields))
}

/// Rebuild tensors from `{shape, dtype, data}` sub-maps, recursing into containers
fn revive_tensors(value: Value) -> Value {
    match value {
        Value::Map(fields) if looks_like_tensor(&fields) => match tensor_from_fields(&fields) {
            Ok(tensor) => Value::Tensor(tensor),
            Err(e) => {
                trace!(error = %e, "Keeping tensor-shaped map as raw value");
                Value::Map(fields)
            }
        },
        Value::Map(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(key, value)| (key, revive_tensors(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(revive_tensors).collect()),
        other => other,
    }
}

/// Extra keys are ignored; only the three tensor fields are read
fn looks_like_tensor(fields: &BTreeMap<String, Value>) -> bool {
    fields.contains_key(TENSOR_SHAPE)
        && fields.contains_key(TENSOR_DTYPE)
        && fields.contains_key(TENSOR_DATA)
}

fn tensor_from_fields(fields: &BTreeMap<String, Value>) -> CodecResult<Tensor> {
    let shape = match fields.get(TENSOR_SHAPE) {
        Some(Value::Array(dims)) => dims
            .iter()
            .map(|dim| match dim {
                Value::Int(i) => usize::try_from(*i)
                    .map_err(|_| CodecError::invalid_tensor_field(TENSOR_SHAPE, "negative dimension")),
                Value::UInt(u) => usize::try_from(*u)
                    .map_err(|_| CodecError::invalid_tensor_field(TENSOR_SHAPE, "dimension too large")),
                other => Err(CodecError::invalid_tensor_field(
                    TENSOR_SHAPE,
                    format!("dimension is a {}", other.kind()),
                )),
            })
            .collect::<CodecResult<Vec<usize>>>()?,
        _ => return Err(CodecError::invalid_tensor_field(TENSOR_SHAPE, "expected an array")),
    };

    let dtype = match fields.get(TENSOR_DTYPE) {
        Some(Value::Str(name)) => DType::from_name(name)?,
        _ => return Err(CodecError::invalid_tensor_field(TENSOR_DTYPE, "expected a string")),
    };

    let data = match fields.get(TENSOR_DATA) {
        Some(Value::Bytes(data)) => data.clone(),
        _ => return Err(CodecError::invalid_tensor_field(TENSOR_DATA, "expected bytes")),
    };

    Ok(Tensor::new(shape, dtype, data)?)
}
