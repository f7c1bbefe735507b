//! Configuration store in the last page of the MCU flash.

use breaker_core::config::store::FramedStore;
use embassy_stm32::flash::{Blocking, Flash};
use embedded_storage::ReadStorage;
use embedded_storage::nor_flash::{NorFlash, RmwNorFlashStorage};
use static_cell::StaticCell;

type McuFlash = Flash<'static, Blocking>;

const PAGE_SIZE: usize = <McuFlash as NorFlash>::ERASE_SIZE;

static MERGE_BUFFER: StaticCell<[u8; PAGE_SIZE]> = StaticCell::new();

pub type FlashStore = FramedStore<RmwNorFlashStorage<'static, McuFlash>>;

/// Wraps the flash in a read-modify-write store rooted at the last page.
///
/// Must be called once; the program image never reaches the last page.
pub fn config_store(flash: McuFlash) -> FlashStore {
    let merge_buffer = MERGE_BUFFER.init([0; PAGE_SIZE]);
    let storage = RmwNorFlashStorage::new(flash, merge_buffer);
    let base = storage.capacity().saturating_sub(PAGE_SIZE);
    FramedStore::new(storage, u32::try_from(base).unwrap_or(0))
}
