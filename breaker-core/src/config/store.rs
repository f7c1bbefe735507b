//! Checksummed configuration records on top of byte-addressable storage.
//!
//! Every record is framed as `{magic, size, crc}` followed by the payload.
//! The header fields are little-endian `u16`s and the checksum is
//! CRC-16/KERMIT over the payload bytes.

use core::fmt;

use crc::{CRC_16_KERMIT, Crc};
use embedded_storage::{ReadStorage, Storage};

use super::{ConfigSection, PersistedConfig};

/// Marker written at the start of every record.
pub const RECORD_MAGIC: u16 = 0xABCD;

/// Length of the record header in bytes.
pub const HEADER_LEN: usize = 6;

/// Largest payload a single record may carry.
pub const MAX_PAYLOAD_LEN: usize = 250;

const HEADER_SPAN: u32 = 6;

const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);

/// Failures surfaced by a [`ConfigStore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The backing storage rejected the access.
    Storage,
    /// No record was found at the offset.
    BadMagic,
    /// The stored record has a different length than requested.
    SizeMismatch,
    /// The payload does not match its checksum.
    CrcMismatch,
    /// The record does not fit inside the backing storage.
    OutOfRange,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Persistence collaborator used to restore and save configuration blobs.
pub trait ConfigStore {
    /// Fills `buf` with the record stored at `offset`.
    ///
    /// # Errors
    ///
    /// Fails on storage errors, bad magic, size mismatch or checksum mismatch.
    fn load(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Writes `buf` as the record stored at `offset`.
    ///
    /// # Errors
    ///
    /// Fails when the storage rejects the write or the record does not fit.
    fn store(&mut self, offset: u32, buf: &[u8]) -> Result<(), StoreError>;
}

/// Reads a typed configuration record.
///
/// # Errors
///
/// Returns `Err` when the record is missing, corrupted or fails validation.
pub fn restore<T, C>(store: &mut C) -> Result<T, RestoreError>
where
    T: PersistedConfig,
    C: ConfigStore + ?Sized,
{
    let mut payload = [0u8; MAX_PAYLOAD_LEN];
    let payload = &mut payload[..T::ENCODED_LEN];
    store
        .load(T::OFFSET, payload)
        .map_err(RestoreError::Store)?;
    T::decode(payload).map_err(|_| RestoreError::Invalid(T::SECTION))
}

/// Writes a typed configuration record.
///
/// # Errors
///
/// Propagates the store failure.
pub fn persist<T, C>(store: &mut C, config: &T) -> Result<(), StoreError>
where
    T: PersistedConfig,
    C: ConfigStore + ?Sized,
{
    let mut payload = [0u8; MAX_PAYLOAD_LEN];
    let payload = &mut payload[..T::ENCODED_LEN];
    config.encode(payload);
    store.store(T::OFFSET, payload)
}

/// Reason a record could not be restored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RestoreError {
    Store(StoreError),
    Invalid(ConfigSection),
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreError::Store(err) => write!(f, "{err}"),
            RestoreError::Invalid(section) => write!(f, "invalid {section} record"),
        }
    }
}

/// [`ConfigStore`] that frames records inside an [`embedded_storage::Storage`].
#[derive(Debug)]
pub struct FramedStore<F> {
    storage: F,
    base: u32,
}

impl<F> FramedStore<F>
where
    F: Storage,
{
    /// Wraps `storage`, placing record offsets relative to `base`.
    pub const fn new(storage: F, base: u32) -> Self {
        Self { storage, base }
    }

    /// Returns the wrapped storage.
    pub fn into_inner(self) -> F {
        self.storage
    }

    /// Provides mutable access to the wrapped storage.
    pub fn storage_mut(&mut self) -> &mut F {
        &mut self.storage
    }

    fn address(&self, offset: u32, len: usize) -> Result<u32, StoreError> {
        let start = self
            .base
            .checked_add(offset)
            .ok_or(StoreError::OutOfRange)?;
        let end = usize::try_from(start)
            .ok()
            .and_then(|start| start.checked_add(HEADER_LEN + len))
            .ok_or(StoreError::OutOfRange)?;
        if end > self.storage.capacity() {
            return Err(StoreError::OutOfRange);
        }
        Ok(start)
    }
}

impl<F> ConfigStore for FramedStore<F>
where
    F: Storage,
{
    fn load(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StoreError> {
        if buf.len() > MAX_PAYLOAD_LEN {
            return Err(StoreError::SizeMismatch);
        }
        let address = self.address(offset, buf.len())?;

        let mut header = [0u8; HEADER_LEN];
        self.storage
            .read(address, &mut header)
            .map_err(|_| StoreError::Storage)?;

        let magic = u16::from_le_bytes([header[0], header[1]]);
        let size = u16::from_le_bytes([header[2], header[3]]);
        let crc = u16::from_le_bytes([header[4], header[5]]);

        if magic != RECORD_MAGIC {
            return Err(StoreError::BadMagic);
        }
        if usize::from(size) != buf.len() {
            return Err(StoreError::SizeMismatch);
        }

        let payload_address = address + HEADER_SPAN;
        self.storage
            .read(payload_address, buf)
            .map_err(|_| StoreError::Storage)?;

        if CHECKSUM.checksum(buf) != crc {
            return Err(StoreError::CrcMismatch);
        }

        Ok(())
    }

    fn store(&mut self, offset: u32, buf: &[u8]) -> Result<(), StoreError> {
        if buf.len() > MAX_PAYLOAD_LEN {
            return Err(StoreError::SizeMismatch);
        }
        let address = self.address(offset, buf.len())?;
        let size = u16::try_from(buf.len()).map_err(|_| StoreError::SizeMismatch)?;

        let mut frame = [0u8; HEADER_LEN + MAX_PAYLOAD_LEN];
        frame[0..2].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        frame[2..4].copy_from_slice(&size.to_le_bytes());
        frame[4..6].copy_from_slice(&CHECKSUM.checksum(buf).to_le_bytes());
        frame[HEADER_LEN..HEADER_LEN + buf.len()].copy_from_slice(buf);

        self.storage
            .write(address, &frame[..HEADER_LEN + buf.len()])
            .map_err(|_| StoreError::Storage)
    }
}

/// Volatile byte storage, used by host tooling and tests in place of an EEPROM.
#[derive(Clone, Debug)]
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
}

/// Error returned by [`RamStorage`] for out-of-bounds accesses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RamStorageOutOfBounds;

impl<const N: usize> RamStorage<N> {
    /// Creates erased storage (all bytes `0xFF`).
    #[must_use]
    pub const fn new() -> Self {
        Self { bytes: [0xFF; N] }
    }

    /// Raw view of the stored bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw view, handy for simulating corruption.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn range(offset: u32, len: usize) -> Result<core::ops::Range<usize>, RamStorageOutOfBounds> {
        let start = usize::try_from(offset).map_err(|_| RamStorageOutOfBounds)?;
        let end = start.checked_add(len).ok_or(RamStorageOutOfBounds)?;
        if end > N {
            return Err(RamStorageOutOfBounds);
        }
        Ok(start..end)
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReadStorage for RamStorage<N> {
    type Error = RamStorageOutOfBounds;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Storage for RamStorage<N> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}
