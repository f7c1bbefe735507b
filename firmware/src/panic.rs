use core::panic::PanicInfo;
use core::ptr;

use defmt::error;

/// GPIOB bit set/reset register.
const GPIOB_BSRR: *mut u32 = 0x5000_0418 as *mut u32;
/// PB3 drives the switch on-command.
const ON_COMMAND_PIN: u32 = 3;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // Release the on-command so the power stage opens.
    unsafe { ptr::write_volatile(GPIOB_BSRR, 1 << (16 + ON_COMMAND_PIN)) };
    error!("PANIC: {}", defmt::Display2Format(info));
    cortex_m::asm::udf();
}
