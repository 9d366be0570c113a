//! Binary encoding of a [PartialResultIndex].
//!
//! The stream is little-endian:
//!
//! * header: magic `RVPI`, `u16` version, `u64` bucket count
//! * one record per bucket, in bucket order: `u32` payload length followed by the payload
//!
//! A payload holds the bucket key (`u8` kind, phase name, receiver grid point(s), source grid
//! point), a `u32` contribution count and every field of each contribution. Strings are length
//! prefixed. Records are self contained, so a short read cannot be resumed and aborts decoding.

use crate::compression::{self, FragmentCompression};
use crate::contribution::PartialContribution;
use crate::error::AggregationError;
use crate::index::{BucketKey, PartialResultIndex, ReceiverPairKey, SingleReceiverKey};
use crate::types::{GridIndex, SeismicPhase};

use bytes::{Buf, BufMut, BytesMut};
use std::io::{Read, Write};

/// Leading bytes of every serialised index.
pub const MAGIC: &[u8; 4] = b"RVPI";

/// Current stream version.
pub const VERSION: u16 = 1;

/// Largest record payload accepted when decoding.
pub const MAX_RECORD_LENGTH: u32 = 256 * 1024 * 1024;

const KIND_SINGLE: u8 = 0;
const KIND_PAIR: u8 = 1;

/// Write `index` to `writer`.
pub fn serialize<W: Write>(
    index: &PartialResultIndex,
    mut writer: W,
) -> Result<(), AggregationError> {
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&u64::try_from(index.bucket_count())?.to_le_bytes())?;
    let mut payload = BytesMut::new();
    for (key, source, bucket) in index.buckets() {
        payload.clear();
        encode_bucket(&mut payload, &key, source, bucket)?;
        let length = u32::try_from(payload.len())?;
        if length > MAX_RECORD_LENGTH {
            return Err(AggregationError::malformed(format!(
                "record length {} exceeds {}",
                length, MAX_RECORD_LENGTH
            )));
        }
        writer.write_all(&length.to_le_bytes())?;
        writer.write_all(&payload)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read an index written by [serialize] from `reader`.
pub fn deserialize<R: Read>(mut reader: R) -> Result<PartialResultIndex, AggregationError> {
    let mut magic = [0; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(AggregationError::malformed("not a partial result index"));
    }
    let mut version = [0; 2];
    reader.read_exact(&mut version)?;
    let version = u16::from_le_bytes(version);
    if version != VERSION {
        return Err(AggregationError::malformed(format!(
            "unsupported version {}",
            version
        )));
    }
    let mut count = [0; 8];
    reader.read_exact(&mut count)?;
    let count = u64::from_le_bytes(count);

    let mut index = PartialResultIndex::new();
    let mut payload = Vec::new();
    for _ in 0..count {
        let mut length = [0; 4];
        reader.read_exact(&mut length)?;
        let length = u32::from_le_bytes(length);
        if length > MAX_RECORD_LENGTH {
            return Err(AggregationError::malformed(format!(
                "record length {} exceeds {}",
                length, MAX_RECORD_LENGTH
            )));
        }
        payload.clear();
        let read = reader.by_ref().take(length.into()).read_to_end(&mut payload)?;
        if read != usize::try_from(length)? {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let (key, source, contributions) = decode_bucket(&payload)?;
        index.append_bucket(key, source, contributions);
    }
    Ok(index)
}

/// Encode an index as fragment file contents.
pub fn encode_fragment(
    index: &PartialResultIndex,
    compression: FragmentCompression,
) -> Result<Vec<u8>, AggregationError> {
    let mut data = Vec::new();
    serialize(index, &mut data)?;
    compression::compress(compression, &data)
}

/// Decode fragment file contents.
pub fn decode_fragment(
    data: &[u8],
    compression: FragmentCompression,
) -> Result<PartialResultIndex, AggregationError> {
    let data = compression::decompress(compression, data)?;
    deserialize(data.as_ref())
}

fn put_str_u8(buf: &mut BytesMut, value: &str) -> Result<(), AggregationError> {
    buf.put_u8(u8::try_from(value.len())?);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_str_u16(buf: &mut BytesMut, value: &str) -> Result<(), AggregationError> {
    buf.put_u16_le(u16::try_from(value.len())?);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn encode_bucket(
    buf: &mut BytesMut,
    key: &BucketKey,
    source: GridIndex,
    bucket: &[PartialContribution],
) -> Result<(), AggregationError> {
    match key {
        BucketKey::Single(key) => {
            buf.put_u8(KIND_SINGLE);
            put_str_u8(buf, &key.phase.to_string())?;
            buf.put_u32_le(key.receiver);
        }
        BucketKey::Pair(key) => {
            buf.put_u8(KIND_PAIR);
            put_str_u8(buf, &key.phase.to_string())?;
            buf.put_u32_le(key.receiver_a);
            buf.put_u32_le(key.receiver_b);
        }
    }
    buf.put_u32_le(source);
    buf.put_u32_le(u32::try_from(bucket.len())?);
    for contribution in bucket {
        buf.put_u32_le(contribution.row_grid_index);
        buf.put_u32_le(contribution.col_grid_index);
        buf.put_f64_le(contribution.row_weight);
        buf.put_f64_le(contribution.col_weight);
        buf.put_f64_le(contribution.covariance);
        buf.put_u32_le(contribution.origin_task_id);
        put_str_u16(buf, &contribution.origin_host)?;
        buf.put_u32_le(contribution.block_row_origin);
        buf.put_u32_le(contribution.block_col_origin);
        buf.put_u32_le(contribution.sequence_counter);
    }
    Ok(())
}

/// Bounds checked reads from a record payload.
struct Payload<'a>(&'a [u8]);

impl<'a> Payload<'a> {
    fn need(&self, n: usize) -> Result<(), AggregationError> {
        if self.0.remaining() < n {
            return Err(AggregationError::malformed("record is truncated"));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, AggregationError> {
        self.need(1)?;
        Ok(self.0.get_u8())
    }

    fn u16(&mut self) -> Result<u16, AggregationError> {
        self.need(2)?;
        Ok(self.0.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32, AggregationError> {
        self.need(4)?;
        Ok(self.0.get_u32_le())
    }

    fn f64(&mut self) -> Result<f64, AggregationError> {
        self.need(8)?;
        Ok(self.0.get_f64_le())
    }

    fn str(&mut self, len: usize) -> Result<String, AggregationError> {
        self.need(len)?;
        let data: &'a [u8] = self.0;
        let (value, rest) = data.split_at(len);
        self.0 = rest;
        String::from_utf8(value.to_vec())
            .map_err(|_| AggregationError::malformed("string is not valid UTF-8"))
    }

    fn phase(&mut self) -> Result<SeismicPhase, AggregationError> {
        let len = self.u8()?;
        self.str(len.into())?.parse()
    }
}

fn decode_bucket(
    data: &[u8],
) -> Result<(BucketKey, GridIndex, Vec<PartialContribution>), AggregationError> {
    let mut payload = Payload(data);
    let key = match payload.u8()? {
        KIND_SINGLE => BucketKey::Single(SingleReceiverKey {
            phase: payload.phase()?,
            receiver: payload.u32()?,
        }),
        KIND_PAIR => BucketKey::Pair(ReceiverPairKey {
            phase: payload.phase()?,
            receiver_a: payload.u32()?,
            receiver_b: payload.u32()?,
        }),
        kind => {
            return Err(AggregationError::malformed(format!(
                "unknown bucket kind {}",
                kind
            )))
        }
    };
    let source = payload.u32()?;
    let count = payload.u32()?;
    let mut contributions = Vec::new();
    for _ in 0..count {
        contributions.push(PartialContribution {
            row_grid_index: payload.u32()?,
            col_grid_index: payload.u32()?,
            row_weight: payload.f64()?,
            col_weight: payload.f64()?,
            covariance: payload.f64()?,
            origin_task_id: payload.u32()?,
            origin_host: {
                let len = payload.u16()?;
                payload.str(len.into())?
            },
            block_row_origin: payload.u32()?,
            block_col_origin: payload.u32()?,
            sequence_counter: payload.u32()?,
        });
    }
    if payload.0.has_remaining() {
        return Err(AggregationError::malformed(format!(
            "{} trailing bytes in record",
            payload.0.remaining()
        )));
    }
    Ok((key, source, contributions))
}
