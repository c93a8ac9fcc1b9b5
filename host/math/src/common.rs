use micromath::F32Ext;

use crate::measurements::{Current, Voltage};
use crate::Resolution;

pub fn round(value: f64) -> f64 {
    (value as f32).round() as f64
}

pub fn clamp_voltage(voltage: Voltage, min: Voltage, max: Voltage) -> Voltage {
    Voltage::from_volts(voltage.as_volts().max(min.as_volts()).min(max.as_volts()))
}

// duty = V / V_supply * max_duty
// the ratio is clamped so the result never exceeds the duty representation of the device
pub fn compute_duty_cycle(voltage: Voltage, supply: Voltage, max_duty: u64) -> u64 {
    if supply.as_volts() <= 0.0 {
        return 0;
    }
    let ratio = (voltage.as_volts() / supply.as_volts()).clamp(0.0, 1.0);
    let duty_cycle = round(ratio * max_duty as f64) as u64;
    duty_cycle.min(max_duty)
}

// I = sample / full_scale * I_full_scale
// I_full_scale: current flowing when the sense voltage reaches the ADC reference
pub fn compute_current(sample: u64, resolution: Resolution, full_scale_current: Current) -> Current {
    let ratio = sample as f64 / resolution.full_scale() as f64;
    Current::from_amperes(ratio * full_scale_current.as_amperes())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_round() {
        assert_eq!(26.0, round(25.5));
        assert_eq!(25.0, round(25.4));
        assert_eq!(0.0, round(0.2));
    }

    #[test]
    fn test_clamp_voltage() {
        let min = Voltage::from_volts(0.0);
        let max = Voltage::from_volts(5.0);
        assert_eq!(5.0, clamp_voltage(Voltage::from_volts(5.02), min, max).as_volts());
        assert_eq!(0.0, clamp_voltage(Voltage::from_volts(-0.02), min, max).as_volts());
        assert_eq!(2.5, clamp_voltage(Voltage::from_volts(2.5), min, max).as_volts());
    }

    #[test]
    fn test_compute_duty_cycle() {
        let supply = Voltage::from_volts(5.0);
        assert_eq!(0, compute_duty_cycle(Voltage::from_volts(0.0), supply, 255));
        assert_eq!(51, compute_duty_cycle(Voltage::from_volts(1.0), supply, 255));
        assert_eq!(26, compute_duty_cycle(Voltage::from_volts(0.5), supply, 255));
        assert_eq!(255, compute_duty_cycle(Voltage::from_volts(5.0), supply, 255));
    }

    #[test]
    fn test_compute_duty_cycle_out_of_range() {
        let supply = Voltage::from_volts(5.0);
        assert_eq!(255, compute_duty_cycle(Voltage::from_volts(7.0), supply, 255));
        assert_eq!(0, compute_duty_cycle(Voltage::from_volts(-1.0), supply, 255));
    }

    #[test]
    fn test_compute_duty_cycle_no_supply() {
        let supply = Voltage::from_volts(0.0);
        assert_eq!(0, compute_duty_cycle(Voltage::from_volts(1.0), supply, 255));
    }

    #[test]
    fn test_compute_duty_cycle_wider_timer() {
        let supply = Voltage::from_volts(5.0);
        assert_eq!(2000, compute_duty_cycle(Voltage::from_volts(2.5), supply, 4000));
    }

    #[test]
    fn test_compute_current_full_scale() {
        let current = compute_current(1023, Resolution::BITS10, Current::from_amperes(0.5));
        assert_abs_diff_eq!(500.0, current.as_milliamperes(), epsilon = 0.000001);
    }

    #[test]
    fn test_compute_current_zero() {
        let current = compute_current(0, Resolution::BITS10, Current::from_amperes(0.5));
        assert_abs_diff_eq!(0.0, current.as_milliamperes(), epsilon = 0.000001);
    }

    #[test]
    fn test_compute_current() {
        let current = compute_current(41, Resolution::BITS10, Current::from_amperes(0.5));
        assert_abs_diff_eq!(20.039100, current.as_milliamperes(), epsilon = 0.00001);
    }

    #[test]
    fn test_compute_current_out_of_range_sample() {
        // readings above full scale are not validated
        let current = compute_current(2046, Resolution::BITS10, Current::from_amperes(0.5));
        assert_abs_diff_eq!(1000.0, current.as_milliamperes(), epsilon = 0.000001);
    }
}
