use common::{PinIndex, PwmBase};

/// Anode output for the lifetime of a plating run.
///
/// The duty cycle drops to zero when the guard is released or dropped, so the
/// output is de-energized whichever way the run ends.
pub struct EnergizedAnode<'a, P: PwmBase> {
    pwm: &'a mut P,
    pin: PinIndex,
}

impl<'a, P: PwmBase> EnergizedAnode<'a, P> {
    pub fn energize(pwm: &'a mut P, pin: PinIndex) -> Self {
        Self { pwm, pin }
    }

    pub fn max_duty(&self) -> u64 {
        self.pwm.get_max_duty()
    }

    pub fn set_duty(&mut self, duty_cycle: u64) {
        self.pwm.set_duty(self.pin, duty_cycle);
    }

    pub fn release(self) {
        drop(self);
    }
}

impl<P: PwmBase> Drop for EnergizedAnode<'_, P> {
    fn drop(&mut self) {
        self.pwm.set_duty(self.pin, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{mock_hardware, SensorModel};

    #[test]
    fn test_anode_energize() {
        let (mut pwm, _adc, state) = mock_hardware(SensorModel::Constant(0));
        let anode = EnergizedAnode::energize(&mut pwm, PinIndex::new(0));
        assert_eq!(255, anode.max_duty());
        assert!(state.borrow().duty_log.is_empty());
    }

    #[test]
    fn test_anode_release() {
        let (mut pwm, _adc, state) = mock_hardware(SensorModel::Constant(0));
        let mut anode = EnergizedAnode::energize(&mut pwm, PinIndex::new(0));
        anode.set_duty(128);
        assert_eq!(Some(&128), state.borrow().duty.get(&PinIndex::new(0)));
        anode.release();
        assert_eq!(Some(&0), state.borrow().duty.get(&PinIndex::new(0)));
    }

    #[test]
    fn test_anode_drop() {
        let (mut pwm, _adc, state) = mock_hardware(SensorModel::Constant(0));
        {
            let mut anode = EnergizedAnode::energize(&mut pwm, PinIndex::new(2));
            anode.set_duty(200);
        }
        assert_eq!(
            vec![(PinIndex::new(2), 200), (PinIndex::new(2), 0)],
            state.borrow().duty_log
        );
    }
}
