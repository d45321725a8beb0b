//! Compact, self-describing binary records with fixed-size fields.
//!
//! A [`ByteStruct`] packs a set of fixed-size fields into one contiguous
//! buffer. The buffer starts with a two byte header (address width and field
//! count), followed by a big-endian table of field offsets, followed by the
//! field data. A buffer produced on one machine can be parsed on another with
//! [`ByteStruct::from_bytes`] without knowing the field layout up front.

use thiserror::Error;

/// Errors from building or accessing a [`ByteStruct`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructError {
    #[error("too many fields: {0} (at most 255)")]
    TooManyFields(usize),
    #[error("field index {index} out of bounds for {count} fields")]
    IndexOutOfBounds { index: usize, count: usize },
    #[error("field {index} holds {size} bytes but {needed} were requested")]
    FieldTooSmall {
        index: usize,
        needed: usize,
        size: usize,
    },
    #[error("buffer of {len} bytes is not a valid struct: {reason}")]
    Malformed { len: usize, reason: &'static str },
}

/// A packed binary record. Field sizes are fixed at construction; reads and
/// writes address fields by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteStruct {
    data: Vec<u8>,
    /// Field start offsets plus one trailing entry at `data.len()`.
    offsets: Vec<usize>,
}

macro_rules! numeric_accessors {
    ($($write:ident / $read:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $write(&mut self, index: usize, value: $ty) -> Result<(), StructError> {
                self.write_raw(index, &value.to_be_bytes())
            }

            pub fn $read(&self, index: usize) -> Result<$ty, StructError> {
                Ok(<$ty>::from_be_bytes(self.read_array(index)?))
            }
        )*
    };
}

impl ByteStruct {
    pub const BYTE: usize = 1;
    pub const SHORT: usize = 2;
    pub const INT: usize = 4;
    pub const LONG: usize = 8;
    pub const FLOAT: usize = 4;
    pub const DOUBLE: usize = 8;
    pub const BOOLEAN: usize = 1;

    /// Allocate a zeroed struct with one field per entry of `field_sizes`.
    pub fn new(field_sizes: &[usize]) -> Result<Self, StructError> {
        let count = field_sizes.len();
        if count > u8::MAX as usize {
            return Err(StructError::TooManyFields(count));
        }
        let payload: usize = field_sizes.iter().sum();

        // smallest address width whose range covers every offset
        let mut address_size = 1;
        let total = loop {
            let total = 2 + count * address_size + payload;
            if (total as u128) < (1u128 << (8 * address_size)) {
                break total;
            }
            address_size += 1;
        };

        let mut data = vec![0u8; total];
        data[0] = address_size as u8;
        data[1] = count as u8;

        let mut offsets = Vec::with_capacity(count + 1);
        let mut offset = 2 + count * address_size;
        for (i, size) in field_sizes.iter().enumerate() {
            let slot = 2 + i * address_size;
            write_address(&mut data[slot..slot + address_size], offset);
            offsets.push(offset);
            offset += size;
        }
        offsets.push(total);

        Ok(Self { data, offsets })
    }

    /// Parse a buffer previously produced by [`into_bytes`](Self::into_bytes)
    /// or [`as_bytes`](Self::as_bytes).
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, StructError> {
        let len = data.len();
        let malformed = |reason| StructError::Malformed { len, reason };

        if len < 2 {
            return Err(malformed("missing header"));
        }
        let address_size = data[0] as usize;
        if !(1..=8).contains(&address_size) {
            return Err(malformed("unsupported address width"));
        }
        let count = data[1] as usize;
        let table_end = 2 + count * address_size;
        if len < table_end {
            return Err(malformed("truncated address table"));
        }

        let mut offsets = Vec::with_capacity(count + 1);
        let mut previous = table_end;
        for i in 0..count {
            let slot = 2 + i * address_size;
            let offset = read_address(&data[slot..slot + address_size]);
            if offset < previous || offset > len {
                return Err(malformed("field offsets out of order"));
            }
            offsets.push(offset);
            previous = offset;
        }
        offsets.push(len);

        Ok(Self { data, offsets })
    }

    pub fn field_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn field_size(&self, index: usize) -> Result<usize, StructError> {
        let (start, end) = self.bounds(index)?;
        Ok(end - start)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Write `bytes` at the start of a field, zero-filling the remainder.
    pub fn write_raw(&mut self, index: usize, bytes: &[u8]) -> Result<(), StructError> {
        let (start, end) = self.bounds(index)?;
        let size = end - start;
        if bytes.len() > size {
            return Err(StructError::FieldTooSmall {
                index,
                needed: bytes.len(),
                size,
            });
        }
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.data[start + bytes.len()..end].fill(0);
        Ok(())
    }

    /// The full contents of a field.
    pub fn read_raw(&self, index: usize) -> Result<&[u8], StructError> {
        let (start, end) = self.bounds(index)?;
        Ok(&self.data[start..end])
    }

    numeric_accessors! {
        write_u8 / read_u8: u8,
        write_i8 / read_i8: i8,
        write_u16 / read_u16: u16,
        write_i16 / read_i16: i16,
        write_u32 / read_u32: u32,
        write_i32 / read_i32: i32,
        write_u64 / read_u64: u64,
        write_i64 / read_i64: i64,
        write_f32 / read_f32: f32,
        write_f64 / read_f64: f64,
    }

    pub fn write_bool(&mut self, index: usize, value: bool) -> Result<(), StructError> {
        self.write_raw(index, &[value as u8])
    }

    pub fn read_bool(&self, index: usize) -> Result<bool, StructError> {
        Ok(self.read_array::<1>(index)?[0] != 0)
    }

    pub fn write_bytes(&mut self, index: usize, bytes: &[u8]) -> Result<(), StructError> {
        self.write_raw(index, bytes)
    }

    pub fn write_str(&mut self, index: usize, value: &str) -> Result<(), StructError> {
        self.write_raw(index, value.as_bytes())
    }

    /// Read a field as text, stopping at the first NUL byte.
    pub fn read_str(&self, index: usize) -> Result<String, StructError> {
        let raw = self.read_raw(index)?;
        let text = match raw.iter().position(|&b| b == 0) {
            Some(end) => &raw[..end],
            None => raw,
        };
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    fn read_array<const N: usize>(&self, index: usize) -> Result<[u8; N], StructError> {
        let (start, end) = self.bounds(index)?;
        let size = end - start;
        if size < N {
            return Err(StructError::FieldTooSmall {
                index,
                needed: N,
                size,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[start..start + N]);
        Ok(out)
    }

    fn bounds(&self, index: usize) -> Result<(usize, usize), StructError> {
        let count = self.field_count();
        if index >= count {
            return Err(StructError::IndexOutOfBounds { index, count });
        }
        Ok((self.offsets[index], self.offsets[index + 1]))
    }
}

fn write_address(slot: &mut [u8], value: usize) {
    let width = slot.len();
    for (i, byte) in slot.iter_mut().enumerate() {
        *byte = (value >> (8 * (width - 1 - i))) as u8;
    }
}

fn read_address(slot: &[u8]) -> usize {
    slot.iter().fold(0, |acc, &b| (acc << 8) | b as usize)
}
