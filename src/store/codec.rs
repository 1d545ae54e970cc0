//! Binary encoding of stored property values.
//!
//! Values are bincode-encoded behind a two byte header: a magic byte and a
//! format version. Rows written by other tools, or truncated rows, fail to
//! decode instead of yielding a wrong value.

use bincode::Options;

use crate::value::PropertyValue;

const MAGIC: u8 = 0xBA;
const FORMAT_VERSION: u8 = 1;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode a value for storage.
pub fn encode(value: &PropertyValue) -> Result<Vec<u8>, String> {
    let body = options().serialize(value).map_err(|e| e.to_string())?;
    let mut blob = Vec::with_capacity(body.len() + 2);
    blob.push(MAGIC);
    blob.push(FORMAT_VERSION);
    blob.extend_from_slice(&body);
    Ok(blob)
}

/// Decode a stored value.
pub fn decode(blob: &[u8]) -> Result<PropertyValue, String> {
    match blob {
        [MAGIC, FORMAT_VERSION, body @ ..] => {
            options().deserialize(body).map_err(|e| e.to_string())
        }
        [MAGIC, version, ..] => Err(format!("unsupported value format version {version}")),
        [] => Err("empty value".to_string()),
        _ => Err("unrecognized value encoding".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header() {
        let blob = encode(&PropertyValue::Boolean(true)).unwrap();
        assert_eq!(&blob[..2], &[MAGIC, FORMAT_VERSION]);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let blob = encode(&PropertyValue::text("Router")).unwrap();
        assert!(decode(&blob[..blob.len() - 2]).is_err());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut blob = encode(&PropertyValue::Unsigned(15)).unwrap();
        blob.push(0);
        assert!(decode(&blob).is_err());
    }

    #[test]
    fn test_foreign_encoding_is_rejected() {
        // Written by another serializer
        assert!(decode(&[0x80, 0x03, 0x4b, 0x0f, 0x2e]).is_err());
        assert!(decode(&[]).is_err());
        assert!(decode(&[MAGIC, 9, 0]).unwrap_err().contains("version 9"));
    }
}
