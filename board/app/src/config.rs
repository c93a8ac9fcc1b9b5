use common::pin::PinSelector;
use embassy_stm32::timer::Channel;

pub const UART_BAUDRATE: u32 = 19200;
pub const MAX_ANALOG_PINS: usize = 4;
// TIM5 runs at 200 MHz, 100 kHz still leaves 2000 duty steps
pub const MIN_PWM_FREQUENCY_HZ: u32 = 1;
pub const MAX_PWM_FREQUENCY_HZ: u32 = 100_000;

#[derive(Clone, Copy)]
pub enum PinFunction {
    // channel of the anode PWM timer (TIM5)
    Pwm(Channel),
    // input of ADC1
    Analog,
    Digital,
}

#[derive(Clone, Copy)]
pub struct PinEntry {
    pub selector: PinSelector,
    pub function: PinFunction,
}

const fn pin(port: u8, pin: u8, function: PinFunction) -> PinEntry {
    PinEntry {
        selector: PinSelector::from_port(port, pin),
        function,
    }
}

/// Pins reachable from a plating command. The position of an entry is the pin index
/// used by the drivers.
pub const PIN_TABLE: [PinEntry; 8] = [
    pin(b'A', 0, PinFunction::Pwm(Channel::Ch1)),
    pin(b'A', 1, PinFunction::Pwm(Channel::Ch2)),
    pin(b'A', 2, PinFunction::Pwm(Channel::Ch3)),
    pin(b'B', 0, PinFunction::Analog),
    pin(b'B', 1, PinFunction::Analog),
    pin(b'C', 0, PinFunction::Analog),
    pin(b'E', 2, PinFunction::Digital),
    pin(b'E', 3, PinFunction::Digital),
];
