use core::fmt::Display;

use common::AdcError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ElectroplatingError {
    InvalidAnodePin,
    AnodeNotPwmCapable,
    InvalidSensorPin,
    SensorReadFailure(AdcError),
}

impl Display for ElectroplatingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ElectroplatingError::InvalidAnodePin => core::write!(f, "Invalid Anode Pin"),
            ElectroplatingError::AnodeNotPwmCapable => {
                core::write!(f, "Anode Pin must be a PWM Pin")
            }
            ElectroplatingError::InvalidSensorPin => core::write!(f, "Invalid Sensor Pin"),
            ElectroplatingError::SensorReadFailure(_) => core::write!(f, "Sensor read failure"),
        }
    }
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for ElectroplatingError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            ElectroplatingError::InvalidAnodePin => defmt::write!(fmt, "Invalid Anode Pin"),
            ElectroplatingError::AnodeNotPwmCapable => {
                defmt::write!(fmt, "Anode Pin must be a PWM Pin")
            }
            ElectroplatingError::InvalidSensorPin => defmt::write!(fmt, "Invalid Sensor Pin"),
            ElectroplatingError::SensorReadFailure(e) => {
                defmt::write!(fmt, "Sensor read failure: {}", e)
            }
        }
    }
}
