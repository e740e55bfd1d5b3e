//! Binary and text encodings.
//!
//! One table is encoded as its cell count followed by its cells, zero-key
//! cell first:
//!
//! ```text
//! binary: [count: varint] [cell] [cell] ...
//! text:   count,cell,cell,...
//! ```
//!
//! Binary cells are `bincode` (standard configuration), text cells are
//! compact JSON: `[key,mapped]` for maps and `key` for sets. A two-level
//! table concatenates its buckets in index order; the text form separates
//! buckets with a comma.

use std::hash::BuildHasher;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cell::{Cell, MapCell, SavedHashMapCell, SetCell, TableKey};
use crate::error::{CodecError, CodecResult, Error, Result};
use crate::table::{FlatTable, Slot};
use crate::two_level::TwoLevelHashTable;

/// Shortest text form of one cell: a separator and a single digit.
const MIN_TEXT_CELL_LEN: usize = 2;

fn encode_binary<T: Serialize, W: Write>(value: T, w: &mut W) -> CodecResult<()> {
    bincode::serde::encode_into_std_write(value, w, bincode::config::standard())
        .map(|_| ())
        .map_err(|e| CodecError::Encode(e.to_string()))
}

fn decode_binary<T: DeserializeOwned, R: Read>(r: &mut R) -> CodecResult<T> {
    bincode::serde::decode_from_std_read(r, bincode::config::standard())
        .map_err(|e| CodecError::Decode(e.to_string()))
}

fn encode_text<T: Serialize, W: Write>(value: &T, w: &mut W) -> CodecResult<()> {
    serde_json::to_writer(&mut *w, value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Per-cell encoding.
pub trait CellCodec: Cell {
    fn write_binary<W: Write>(&self, w: &mut W) -> CodecResult<()>;

    fn read_binary<R: Read>(r: &mut R) -> CodecResult<(Self::Key, Self::Mapped)>;

    fn write_text<W: Write>(&self, w: &mut W) -> CodecResult<()>;

    fn read_text(r: &mut TextReader<'_>) -> CodecResult<(Self::Key, Self::Mapped)>;
}

impl<K> CellCodec for SetCell<K>
where
    K: TableKey + Serialize + DeserializeOwned,
{
    fn write_binary<W: Write>(&self, w: &mut W) -> CodecResult<()> {
        encode_binary(self.key(), w)
    }

    fn read_binary<R: Read>(r: &mut R) -> CodecResult<(K, ())> {
        Ok((decode_binary(r)?, ()))
    }

    fn write_text<W: Write>(&self, w: &mut W) -> CodecResult<()> {
        encode_text(self.key(), w)
    }

    fn read_text(r: &mut TextReader<'_>) -> CodecResult<(K, ())> {
        Ok((r.read_json()?, ()))
    }
}

macro_rules! impl_map_cell_codec {
    ($($cell:ident),*) => {
        $(
            impl<K, V> CellCodec for $cell<K, V>
            where
                K: TableKey + Serialize + DeserializeOwned,
                V: Serialize + DeserializeOwned,
            {
                fn write_binary<W: Write>(&self, w: &mut W) -> CodecResult<()> {
                    encode_binary((self.key(), self.mapped()), w)
                }

                fn read_binary<R: Read>(r: &mut R) -> CodecResult<(K, V)> {
                    decode_binary(r)
                }

                fn write_text<W: Write>(&self, w: &mut W) -> CodecResult<()> {
                    encode_text(&(self.key(), self.mapped()), w)
                }

                fn read_text(r: &mut TextReader<'_>) -> CodecResult<(K, V)> {
                    r.read_json()
                }
            }
        )*
    };
}

impl_map_cell_codec!(MapCell, SavedHashMapCell);

/// Byte cursor over a text document.
#[derive(Debug, Clone)]
pub struct TextReader<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> TextReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.offset..]
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.input.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.offset).copied()
    }

    /// Consumes `expected` or fails without consuming anything.
    pub fn expect(&mut self, expected: u8) -> CodecResult<()> {
        match self.peek() {
            Some(b) if b == expected => {
                self.offset += 1;
                Ok(())
            }
            found => Err(CodecError::UnexpectedChar {
                expected: expected as char,
                found: found.map_or_else(|| "end of input".to_string(), |b| format!("{:?}", b as char)),
                offset: self.offset,
            }),
        }
    }

    /// Reads an unsigned decimal count.
    pub fn read_count(&mut self) -> CodecResult<usize> {
        let digits = self.remaining().iter().take_while(|b| b.is_ascii_digit()).count();
        let invalid = CodecError::InvalidCount { offset: self.offset };
        if digits == 0 {
            return Err(invalid);
        }
        let text = std::str::from_utf8(&self.remaining()[..digits]).map_err(|_| CodecError::InvalidCount {
            offset: self.offset,
        })?;
        let count = text.parse::<usize>().map_err(|_| invalid)?;
        self.offset += digits;
        Ok(count)
    }

    /// Reads one JSON value and stops right after it.
    pub fn read_json<T: DeserializeOwned>(&mut self) -> CodecResult<T> {
        let mut stream = serde_json::Deserializer::from_slice(self.remaining()).into_iter::<T>();
        match stream.next() {
            Some(Ok(value)) => {
                self.offset += stream.byte_offset();
                Ok(value)
            }
            Some(Err(e)) => Err(CodecError::Text {
                offset: self.offset,
                message: e.to_string(),
            }),
            None => Err(CodecError::Text {
                offset: self.offset,
                message: "unexpected end of input".to_string(),
            }),
        }
    }
}

/// Encoding of a whole single-level table.
///
/// Decoding replaces the table's contents.
pub trait BucketCodec: FlatTable {
    fn write<W: Write>(&self, w: &mut W) -> CodecResult<()>;

    fn read<R: Read>(&mut self, r: &mut R) -> CodecResult<()>;

    fn write_text<W: Write>(&self, w: &mut W) -> CodecResult<()>;

    fn read_text(&mut self, r: &mut TextReader<'_>) -> CodecResult<()>;
}

/// Adds one decoded cell, rejecting repeated keys and a zero key anywhere
/// but first.
fn restore_cell<T: FlatTable>(
    table: &mut T,
    index: usize,
    key: <T::Cell as Cell>::Key,
    mapped: <T::Cell as Cell>::Mapped,
) -> CodecResult<()> {
    if index != 0 && key.is_zero() {
        return Err(CodecError::MisplacedZero { index });
    }
    let hash = table.hasher().hash_one(&key);
    match table.emplace(key, hash) {
        Slot::Occupied(_) => Err(CodecError::DuplicateKey { index }),
        Slot::Vacant(slot) => {
            slot.finish(mapped);
            Ok(())
        }
    }
}

/// Empties `table`, presized for `capacity` cells.
fn reset<T: FlatTable>(table: &mut T, capacity: usize) {
    *table = T::with_capacity_and_hasher(capacity, table.hasher().clone());
}

impl<T> BucketCodec for T
where
    T: FlatTable,
    T::Cell: CellCodec,
{
    fn write<W: Write>(&self, w: &mut W) -> CodecResult<()> {
        encode_binary(self.len() as u64, w)?;
        for cell in self.iter() {
            cell.write_binary(w)?;
        }
        Ok(())
    }

    fn read<R: Read>(&mut self, r: &mut R) -> CodecResult<()> {
        let count: u64 = decode_binary(r)?;
        let count = usize::try_from(count).map_err(|e| CodecError::Decode(e.to_string()))?;
        // The stream length is unknown, so an unchecked count must not size
        // the table; it grows as cells actually arrive.
        reset(self, 0);
        for index in 0..count {
            let (key, mapped) = <T::Cell as CellCodec>::read_binary(r)?;
            restore_cell(self, index, key, mapped)?;
        }
        Ok(())
    }

    fn write_text<W: Write>(&self, w: &mut W) -> CodecResult<()> {
        write!(w, "{}", self.len())?;
        for cell in self.iter() {
            w.write_all(b",")?;
            cell.write_text(w)?;
        }
        Ok(())
    }

    fn read_text(&mut self, r: &mut TextReader<'_>) -> CodecResult<()> {
        let count = r.read_count()?;
        reset(self, count.min(r.remaining().len() / MIN_TEXT_CELL_LEN));
        for index in 0..count {
            r.expect(b',')?;
            let (key, mapped) = <T::Cell as CellCodec>::read_text(r)?;
            restore_cell(self, index, key, mapped)?;
        }
        Ok(())
    }
}

impl<T, const N: usize> TwoLevelHashTable<T, N>
where
    T: BucketCodec,
{
    /// Writes every bucket's binary encoding, bucket 0 first, with no
    /// framing between buckets.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        for (bucket, table) in self.buckets().iter().enumerate() {
            table.write(w).map_err(|source| Error::Encode { bucket, source })?;
        }
        Ok(())
    }

    /// Writes every bucket's text encoding, separated by commas.
    pub fn write_text<W: Write>(&self, w: &mut W) -> Result<()> {
        for (bucket, table) in self.buckets().iter().enumerate() {
            let written = if bucket != 0 {
                w.write_all(b",").map_err(CodecError::from)
            } else {
                Ok(())
            };
            written
                .and_then(|()| table.write_text(w))
                .map_err(|source| Error::Encode { bucket, source })?;
        }
        Ok(())
    }

    /// Replaces the contents with exactly `N` buckets read from `r`.
    ///
    /// On error the buckets before the failing one hold decoded data and the
    /// rest keep their previous contents.
    pub fn read<R: Read>(&mut self, r: &mut R) -> Result<()> {
        for (bucket, table) in self.buckets_mut().iter_mut().enumerate() {
            table
                .read(r)
                .and_then(|()| Self::check_routing(table, bucket))
                .map_err(|source| Error::Decode { bucket, source })?;
        }
        debug!(cells = self.len(), buckets = N, "decoded two-level table");
        Ok(())
    }

    /// Reads the whole of `r` as a text document and decodes it. Anything
    /// after the last bucket is an error.
    pub fn read_text<R: Read>(&mut self, mut r: R) -> Result<()> {
        let mut input = Vec::new();
        r.read_to_end(&mut input)?;
        let mut reader = TextReader::new(&input);
        self.read_text_from(&mut reader)?;
        if !reader.is_at_end() {
            return Err(Error::TrailingInput {
                offset: reader.offset(),
            });
        }
        Ok(())
    }

    /// Decodes `N` comma-separated buckets from `reader`, leaving it right
    /// after the last bucket.
    pub fn read_text_from(&mut self, reader: &mut TextReader<'_>) -> Result<()> {
        for (bucket, table) in self.buckets_mut().iter_mut().enumerate() {
            if bucket != 0 {
                reader
                    .expect(b',')
                    .map_err(|source| Error::Decode { bucket, source })?;
            }
            table
                .read_text(reader)
                .and_then(|()| Self::check_routing(table, bucket))
                .map_err(|source| Error::Decode { bucket, source })?;
        }
        debug!(cells = self.len(), buckets = N, "decoded two-level table from text");
        Ok(())
    }

    /// Every cell decoded into `bucket` must hash to it.
    fn check_routing(table: &T, bucket: usize) -> CodecResult<()> {
        let misrouted = table
            .iter()
            .map(|cell| Self::bucket_from_hash(cell.hash_of(table.hasher())))
            .find(|&owner| owner != bucket);
        match misrouted {
            Some(owner) => Err(CodecError::Misrouted { owner }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{FlatHashMap, FlatHashSet};

    #[test]
    fn test_bucket_text_layout() {
        let mut t = FlatHashMap::<u64, String>::new();
        t.insert((0, "z".to_string()));
        let mut out = Vec::new();
        t.write_text(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"1,[0,"z"]"#);
    }

    #[test]
    fn test_bucket_text_round_trip_with_commas_in_values() {
        let mut t = FlatHashMap::<String, String>::new();
        t.insert(("a,b".to_string(), "c,d".to_string()));
        t.insert((String::new(), "zero".to_string()));
        let mut out = Vec::new();
        t.write_text(&mut out).unwrap();

        let mut back = FlatHashMap::<String, String>::new();
        let mut reader = TextReader::new(&out);
        back.read_text(&mut reader).unwrap();
        assert!(reader.is_at_end());
        assert_eq!(back.len(), 2);
        assert_eq!(back.get(&"a,b".to_string()).map(String::as_str), Some("c,d"));
        assert_eq!(back.get(&String::new()).map(String::as_str), Some("zero"));
    }

    #[test]
    fn test_bucket_binary_round_trip() {
        let mut t = FlatHashSet::<u32>::new();
        for k in [0u32, 1, 2, 300, 70_000] {
            t.insert(k);
        }
        let mut out = Vec::new();
        t.write(&mut out).unwrap();

        let mut back = FlatHashSet::<u32>::new();
        back.insert(9);
        back.read(&mut out.as_slice()).unwrap();
        assert_eq!(back.len(), 5);
        assert!(!back.contains_key(&9));
        assert!(back.contains_key(&0));
        assert!(back.contains_key(&70_000));
    }

    #[test]
    fn test_misplaced_zero_is_rejected() {
        let mut reader = TextReader::new(b"2,5,0");
        let mut t = FlatHashSet::<u32>::new();
        let err = t.read_text(&mut reader).unwrap_err();
        assert!(matches!(err, CodecError::MisplacedZero { index: 1 }));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut reader = TextReader::new(b"2,[5,1],[5,2]");
        let mut t = FlatHashMap::<u32, u32>::new();
        let err = t.read_text(&mut reader).unwrap_err();
        assert!(matches!(err, CodecError::DuplicateKey { index: 1 }));
    }

    #[test]
    fn test_truncated_binary_is_an_error() {
        let mut t = FlatHashMap::<u64, u64>::new();
        t.insert((1, 2));
        t.insert((3, 4));
        let mut out = Vec::new();
        t.write(&mut out).unwrap();
        out.truncate(out.len() - 1);
        let mut back = FlatHashMap::<u64, u64>::new();
        assert!(matches!(back.read(&mut out.as_slice()), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_text_reader_count_and_expect() {
        let mut r = TextReader::new(b"12,x");
        assert_eq!(r.read_count().unwrap(), 12);
        r.expect(b',').unwrap();
        let err = r.expect(b',').unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedChar { offset: 3, .. }));
        assert_eq!(r.offset(), 3);
    }
}
