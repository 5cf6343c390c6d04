//! Transparent gzip+base64 compression for the opaque `output`/`error_output`
//! result columns. These are plain `TEXT` columns, so unlike the byte-column
//! blob this pattern is grounded on elsewhere in this codebase, the
//! compressed form is base64-wrapped before it is stored.
//!
//! Decompression never errors: a value that isn't base64, or doesn't
//! gzip-decode, is assumed to be older uncompressed plain text and is
//! returned unchanged - the same fail-open behavior this codebase's other
//! opaque-blob compression follows.
use common_compression::{compress_data, decode_base64, decompress_data, encode_base64, CompressionFormat};

use crate::metrics_consts;

pub fn compress_result_field(value: Option<String>) -> Option<String> {
    let value = value?;
    if value.is_empty() {
        return Some(value);
    }

    match compress_data(value.as_bytes(), CompressionFormat::Gzip) {
        Ok(compressed) => {
            common_metrics::inc(metrics_consts::RESULT_FIELD_COMPRESSED, &[], 1);
            Some(encode_base64(&compressed))
        }
        Err(_) => Some(value),
    }
}

pub fn decompress_result_field(value: Option<String>) -> Option<String> {
    let value = value?;
    if value.is_empty() {
        return Some(value);
    }

    let recovered = decode_base64(&value)
        .ok()
        .and_then(|bytes| decompress_data(&bytes).ok());

    Some(recovered.unwrap_or(value))
}
