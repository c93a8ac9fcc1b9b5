use core::time::Duration;

use common::pin::{PA0, PB0};
use common::{PinSelector, PlatingArgs};
use math::measurements::{Current, Frequency, Voltage};

pub const DEFAULT_ANODE_PIN: PinSelector = PA0;
pub const DEFAULT_SENSOR_PIN: PinSelector = PB0;
pub const DEFAULT_TARGET_CURRENT_MA: f64 = 20.0;
pub const DEFAULT_STEP_SIZE_V: f64 = 0.02;
pub const DEFAULT_PWM_FREQUENCY_HZ: f64 = 1000.0;
pub const DEFAULT_DURATION: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlParameters {
    pub anode: PinSelector,
    pub sensor: PinSelector,
    pub target_current: Current,
    pub step_size: Voltage,
    pub pwm_frequency: Frequency,
    pub duration: Duration,
}

impl Default for ControlParameters {
    fn default() -> Self {
        Self {
            anode: DEFAULT_ANODE_PIN,
            sensor: DEFAULT_SENSOR_PIN,
            target_current: Current::from_milliamperes(DEFAULT_TARGET_CURRENT_MA),
            step_size: Voltage::from_volts(DEFAULT_STEP_SIZE_V),
            pwm_frequency: Frequency::from_hertz(DEFAULT_PWM_FREQUENCY_HZ),
            duration: DEFAULT_DURATION,
        }
    }
}

impl ControlParameters {
    /// Fills every parameter missing from the invocation with its default.
    pub fn resolve(args: &PlatingArgs) -> Self {
        let defaults = Self::default();
        Self {
            anode: args.anode.unwrap_or(defaults.anode),
            sensor: args.sensor.unwrap_or(defaults.sensor),
            target_current: args.target_current.unwrap_or(defaults.target_current),
            step_size: args.step_size.unwrap_or(defaults.step_size),
            pwm_frequency: args.pwm_frequency.unwrap_or(defaults.pwm_frequency),
            duration: args.duration.unwrap_or(defaults.duration),
        }
    }
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for ControlParameters {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "[anode: {}] [sensor: {}] [target: {} mA] [step: {} V] [pwm: {} Hz] [duration: {} ms]",
            self.anode,
            self.sensor,
            self.target_current.as_milliamperes(),
            self.step_size.as_volts(),
            self.pwm_frequency.as_hertz(),
            self.duration.as_millis() as u64
        )
    }
}

/// Electrical characteristics of the plating rig.
#[derive(Clone, Copy, Debug)]
pub struct PlatingOptions {
    // upper rail of the anode driver, the output voltage never exceeds it
    pub supply_voltage: Voltage,
    pub initial_voltage: Voltage,
    // pause between a duty cycle change and the next current sample
    pub settling_interval: Duration,
    // current flowing when the sensor reads full scale
    pub full_scale_current: Current,
}

impl Default for PlatingOptions {
    fn default() -> Self {
        Self {
            supply_voltage: Voltage::from_volts(5.0),
            initial_voltage: Voltage::from_volts(0.5),
            settling_interval: Duration::from_millis(50),
            full_scale_current: Current::from_amperes(0.5),
        }
    }
}
