//! Structured file I/O for binary index files.
//!
//! Every file written through [`StructWriter`] is a sequence of little-endian
//! fixed-width integers, LEB128 varints and length-prefixed byte strings,
//! followed by a CRC32 of everything before it. [`StructReader`] mirrors the
//! writer and checks the trailer with [`StructReader::verify_checksum`].
//!
//! Both sides also keep an xxh3-128 digest of the bytes they have seen, which
//! identifies file contents across instances where the CRC only guards
//! against corruption.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use xxhash_rust::xxh3::Xxh3;

use crate::error::{Result, TesseraError};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint::{decode_u64, encode_u64};

pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    digest: Xxh3,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            digest: Xxh3::new(),
            position: 0,
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.track(&[value]);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.track(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.track(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.writer.write_all(&encoded)?;
        self.track(&encoded);
        Ok(())
    }

    /// Signed values are zig-zag encoded so small negatives stay short.
    pub fn write_varint_i64(&mut self, value: i64) -> Result<()> {
        self.write_varint(((value << 1) ^ (value >> 63)) as u64)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.writer.write_all(value)?;
        self.track(value);
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// xxh3-128 of everything written so far, trailer excluded.
    pub fn digest(&self) -> u128 {
        self.digest.digest128()
    }

    fn track(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.digest.update(data);
        self.position += data.len() as u64;
    }

    /// Append the checksum trailer and close the underlying output.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.checksum();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.flush_and_sync()?;
        self.writer.close()?;
        Ok(())
    }
}

pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: Hasher,
    digest: Xxh3,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            hasher: Hasher::new(),
            digest: Xxh3::new(),
            position: 0,
            file_size,
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8()?;
        self.track(&[value]);
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<LittleEndian>()?;
        self.track(&value.to_le_bytes());
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.reader.read_u64::<LittleEndian>()?;
        self.track(&value.to_le_bytes());
        Ok(value)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut bytes = Vec::with_capacity(4);
        loop {
            let byte = self.reader.read_u8()?;
            bytes.push(byte);
            if byte & 0x80 == 0 {
                break;
            }
        }

        let (value, _) = decode_u64(&bytes)?;
        self.track(&bytes);
        Ok(value)
    }

    pub fn read_varint_i64(&mut self) -> Result<i64> {
        let raw = self.read_varint()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    /// Read a varint that must fit in a `u32`.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let value = self.read_varint()?;
        u32::try_from(value)
            .map_err(|_| TesseraError::storage(format!("Value {value} does not fit in u32")))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| TesseraError::storage(format!("Invalid UTF-8: {e}")))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_length()?;
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.track(&bytes);
        Ok(bytes)
    }

    /// Read a collection length, rejecting values larger than the file.
    pub fn read_length(&mut self) -> Result<usize> {
        let length = self.read_varint()?;
        if length > self.file_size {
            return Err(TesseraError::storage(format!(
                "Corrupt length {length} at offset {}",
                self.position
            )));
        }
        Ok(length as usize)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn size(&self) -> u64 {
        self.file_size
    }

    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// xxh3-128 of everything read so far; matches [`StructWriter::digest`]
    /// once the same bytes have been consumed.
    pub fn digest(&self) -> u128 {
        self.digest.digest128()
    }

    fn track(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.digest.update(data);
        self.position += data.len() as u64;
    }

    /// Compare the trailer with the checksum of everything read so far.
    pub fn verify_checksum(&mut self) -> Result<bool> {
        if self.position + 4 > self.file_size {
            return Err(TesseraError::storage("File too short for checksum"));
        }

        let stored_checksum = self.reader.read_u32::<LittleEndian>()?;
        Ok(stored_checksum == self.checksum())
    }

    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};

    #[test]
    fn test_struct_writer_reader() {
        let storage = MemoryStorage::new_default();

        let written_digest = {
            let output = storage.create_output("test.struct").unwrap();
            let mut writer = StructWriter::new(output);

            writer.write_u8(42).unwrap();
            writer.write_u32(5678).unwrap();
            writer.write_u64(9876543210).unwrap();
            writer.write_varint(12345).unwrap();
            writer.write_varint_i64(-7).unwrap();
            writer.write_string("<>:base/s:s").unwrap();
            writer.write_bytes(b"binary data").unwrap();

            let digest = writer.digest();
            writer.close().unwrap();
            digest
        };

        let input = storage.open_input("test.struct").unwrap();
        let mut reader = StructReader::new(input).unwrap();

        assert_eq!(reader.read_u8().unwrap(), 42);
        assert_eq!(reader.read_u32().unwrap(), 5678);
        assert_eq!(reader.read_u64().unwrap(), 9876543210);
        assert_eq!(reader.read_varint().unwrap(), 12345);
        assert_eq!(reader.read_varint_i64().unwrap(), -7);
        assert_eq!(reader.read_string().unwrap(), "<>:base/s:s");
        assert_eq!(reader.read_bytes().unwrap(), b"binary data");
        assert_eq!(reader.position() + 4, reader.size());
        assert_eq!(reader.digest(), written_digest);
        assert!(reader.verify_checksum().unwrap());
    }

    #[test]
    fn test_checksum_covers_every_byte() {
        let storage = MemoryStorage::new_default();

        // Two files that only differ in their first byte must not share a
        // checksum, which a last-write-wins checksum would allow.
        for (name, first) in [("a", 1u8), ("b", 2u8)] {
            let output = storage.create_output(name).unwrap();
            let mut writer = StructWriter::new(output);
            writer.write_u8(first).unwrap();
            writer.write_string("same tail").unwrap();
            writer.close().unwrap();
        }

        let checksum_of = |name: &str| {
            let mut reader = StructReader::new(storage.open_input(name).unwrap()).unwrap();
            reader.read_u8().unwrap();
            reader.read_string().unwrap();
            assert!(reader.verify_checksum().unwrap());
            reader.checksum()
        };

        assert_ne!(checksum_of("a"), checksum_of("b"));
    }

    #[test]
    fn test_digest_depends_on_content_only() {
        let storage = MemoryStorage::new_default();
        let digest_of = |name: &str, text: &str| {
            let mut writer = StructWriter::new(storage.create_output(name).unwrap());
            writer.write_string(text).unwrap();
            let digest = writer.digest();
            writer.close().unwrap();
            digest
        };

        assert_eq!(digest_of("x", "der alte Baum"), digest_of("y", "der alte Baum"));
        assert_ne!(digest_of("x", "der alte Baum"), digest_of("x", "der alte Wald"));
    }

    #[test]
    fn test_corruption_is_detected() {
        let storage = MemoryStorage::new_default();
        {
            let mut writer = StructWriter::new(storage.create_output("c").unwrap());
            writer.write_u32(7).unwrap();
            writer.close().unwrap();
        }

        // Rewrite the payload but keep the old trailer.
        let mut bytes = Vec::new();
        storage
            .open_input("c")
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        bytes[0] = 8;
        {
            let mut output = storage.create_output("c").unwrap();
            output.write_all(&bytes).unwrap();
            output.close().unwrap();
        }

        let mut reader = StructReader::new(storage.open_input("c").unwrap()).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 8);
        assert!(!reader.verify_checksum().unwrap());
    }
}
