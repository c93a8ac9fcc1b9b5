use common::{AdcBase, PinIndex, PinMap, PwmBase};
use math::measurements::Frequency;

use crate::{config::ControlParameters, error::ElectroplatingError};

/// Pins of a plating run, already checked against the board pin table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlatingPins {
    pub anode: PinIndex,
    pub sensor: PinIndex,
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for PlatingPins {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "[anode: {}] [sensor: {}]",
            i32::from(self.anode),
            i32::from(self.sensor)
        )
    }
}

// anode is validated first, then its pwm capability, then the sensor.
// nothing is touched on the hardware until every check passed
pub fn resolve_pins<M: PinMap>(
    pin_map: &M,
    params: &ControlParameters,
) -> Result<PlatingPins, ElectroplatingError> {
    let anode = PinIndex::try_from(pin_map.pin_index(params.anode))
        .map_err(|_| ElectroplatingError::InvalidAnodePin)?;
    if !pin_map.is_pwm_pin(anode) {
        return Err(ElectroplatingError::AnodeNotPwmCapable);
    }
    let sensor = PinIndex::try_from(pin_map.pin_index(params.sensor))
        .map_err(|_| ElectroplatingError::InvalidSensorPin)?;
    Ok(PlatingPins { anode, sensor })
}

pub fn configure_pins<P: PwmBase, A: AdcBase>(
    pins: &PlatingPins,
    frequency: Frequency,
    pwm: &mut P,
    adc: &mut A,
) {
    pwm.configure_output(pins.anode);
    pwm.set_frequency(pins.anode, frequency);
    adc.enable(pins.sensor);
}
