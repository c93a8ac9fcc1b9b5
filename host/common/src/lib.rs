#![cfg_attr(not(test), no_std)]

use core::{future::Future, time::Duration};

use math::measurements::{Current, Frequency, Voltage};
use math::Resolution;

pub mod pin;

pub use pin::{PinIndex, PinSelector};

/// Named parameters of a plating invocation, as they come from the command line.
/// Every field is optional; defaults are applied when the parameters are resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlatingArgs {
    pub anode: Option<PinSelector>,
    pub sensor: Option<PinSelector>,
    pub target_current: Option<Current>,
    pub step_size: Option<Voltage>,
    pub pwm_frequency: Option<Frequency>,
    pub duration: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AdcError {
    PinNotEnabled,
    Hardware,
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for AdcError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            AdcError::PinNotEnabled => defmt::write!(fmt, "pin not enabled"),
            AdcError::Hardware => defmt::write!(fmt, "hardware fault"),
        }
    }
}

/// Board pin table: maps the number written in a command to the index used by the drivers.
pub trait PinMap {
    /// negative when the selector doesn't match any pin of the board
    fn pin_index(&self, selector: PinSelector) -> i32;
    fn is_pwm_pin(&self, pin: PinIndex) -> bool;
}

pub trait PwmBase {
    fn configure_output(&mut self, pin: PinIndex);
    fn set_frequency(&mut self, pin: PinIndex, frequency: Frequency);
    fn get_max_duty(&self) -> u64;
    fn set_duty(&mut self, pin: PinIndex, duty_cycle: u64);
}

pub trait AdcBase {
    fn enable(&mut self, pin: PinIndex);
    fn resolution(&self) -> Resolution;
    fn read(&mut self, pin: PinIndex) -> impl Future<Output = Result<u16, AdcError>>;
}

pub trait TimerBase {
    /// monotonic time since an arbitrary origin
    fn now(&self) -> Duration;
    fn after(&self, duration: Duration) -> impl Future<Output = ()>;
}

pub trait AbortSignal {
    /// resolves when the running job has to stop
    fn wait(&mut self) -> impl Future<Output = ()>;
}

pub struct NeverAbort;

impl AbortSignal for NeverAbort {
    fn wait(&mut self) -> impl Future<Output = ()> {
        core::future::pending()
    }
}
