use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use breaker_core::console::{LineBuffer, LineStatus};

use crate::console::{ConsoleLine, LineChannel, ReplyChannel};

const CONSOLE_BAUD: u32 = 115_200;
const UART_BUFFER_SIZE: usize = 256;
const PROMPT: &[u8] = b"> ";

static UART_TX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

async fn write_all<W: Write>(uart: &mut W, bytes: &[u8]) {
    if uart.write_all(bytes).await.is_err() || uart.flush().await.is_err() {
        defmt::warn!("console: UART write error");
    }
}

#[embassy_executor::task]
pub async fn run(
    lines: &'static LineChannel,
    replies: &'static ReplyChannel,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new(
        usart,
        rx_pin,
        tx_pin,
        UART_TX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UART_RX_BUFFER.init([0; UART_BUFFER_SIZE]),
        UartIrqs,
        config,
    );
    let Ok(uart) = uart else {
        defmt::error!("console: UART configuration rejected");
        loop {
            core::future::pending::<()>().await;
        }
    };
    let (mut uart_tx, mut uart_rx) = uart.split();

    let mut buffer = LineBuffer::new();
    let mut ingress = [0u8; 32];
    write_all(&mut uart_tx, PROMPT).await;

    loop {
        let count = match uart_rx.read(&mut ingress).await {
            Ok(count) => count,
            Err(_) => {
                defmt::warn!("console: UART read error");
                Timer::after(Duration::from_millis(5)).await;
                continue;
            }
        };

        for &byte in &ingress[..count] {
            match buffer.push(byte) {
                Ok(LineStatus::Pending) => {}
                Ok(LineStatus::Complete) => {
                    let line = buffer.line().map(ConsoleLine::try_from);
                    match line {
                        Ok(Ok(line)) => {
                            write_all(&mut uart_tx, b"\r\n").await;
                            lines.send(line).await;
                            let reply = replies.receive().await;
                            write_all(&mut uart_tx, reply.as_bytes()).await;
                        }
                        Ok(Err(_)) | Err(_) => {
                            write_all(&mut uart_tx, b"\r\nERR invalid line\n").await;
                        }
                    }
                    write_all(&mut uart_tx, PROMPT).await;
                }
                Err(err) => {
                    defmt::warn!("console: {}", err);
                    write_all(&mut uart_tx, b"\r\nERR line too long\n").await;
                    write_all(&mut uart_tx, PROMPT).await;
                }
            }
        }
    }
}
