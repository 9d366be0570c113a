//! (De)compression support for fragment files.

use crate::error::AggregationError;

use bytes::Bytes;
use flate2::read::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Compression applied to whole fragment files
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FragmentCompression {
    /// No compression
    #[default]
    None,
    /// Gzip
    Gzip,
}

/// Compresses some data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Uncompressed data
pub fn compress(
    compression: FragmentCompression,
    data: &[u8],
) -> Result<Vec<u8>, AggregationError> {
    match compression {
        FragmentCompression::None => Ok(data.to_vec()),
        FragmentCompression::Gzip => compress_flate2_gzip(data),
    }
}

/// Decompresses some data and returns the uncompressed data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Compressed data
pub fn decompress(
    compression: FragmentCompression,
    data: &[u8],
) -> Result<Bytes, AggregationError> {
    match compression {
        FragmentCompression::None => Ok(Bytes::copy_from_slice(data)),
        FragmentCompression::Gzip => decompress_flate2_gzip(data),
    }
}

fn compress_flate2_gzip(data: &[u8]) -> Result<Vec<u8>, AggregationError> {
    let mut encoder = GzEncoder::new(data, flate2::Compression::default());
    let mut buf = Vec::new();
    encoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn decompress_flate2_gzip(data: &[u8]) -> Result<Bytes, AggregationError> {
    let mut decoder = GzDecoder::new(data);
    // Fragments compress well; start from a larger buffer than the input.
    let mut buf = Vec::with_capacity(4 * data.len());
    decoder.read_to_end(&mut buf)?;
    Ok(buf.into())
}
