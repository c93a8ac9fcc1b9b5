//! In-memory hardware used by the tests, with a scripted clock and a crude model of
//! the plating cell.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    future::Future,
    rc::Rc,
    time::Duration,
};

use common::{AbortSignal, AdcBase, AdcError, PinIndex, PinMap, PinSelector, PwmBase, TimerBase};
use math::{common::round, measurements::Frequency, Resolution};

pub const MOCK_MAX_DUTY: u64 = 255;
pub const MOCK_SUPPLY_VOLTS: f64 = 5.0;
pub const MOCK_FULL_SCALE_MA: f64 = 500.0;

/// Pin table of `pin_count` pins; selectors map onto the index with the same value.
pub struct MockPinMap {
    pin_count: i32,
    pwm_pins: Vec<PinIndex>,
}

impl MockPinMap {
    pub fn new(pin_count: i32, pwm_pins: &[u16]) -> Self {
        Self {
            pin_count,
            pwm_pins: pwm_pins.iter().map(|p| PinIndex::new(*p)).collect(),
        }
    }
}

impl Default for MockPinMap {
    fn default() -> Self {
        Self::new(48, &[0, 1, 2, 3])
    }
}

impl PinMap for MockPinMap {
    fn pin_index(&self, selector: PinSelector) -> i32 {
        if (0..self.pin_count).contains(&selector.value()) {
            selector.value()
        } else {
            -1
        }
    }

    fn is_pwm_pin(&self, pin: PinIndex) -> bool {
        self.pwm_pins.contains(&pin)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorModel {
    Constant(u16),
    // the cell draws `milliamps_per_volt` for every volt applied to the anode
    Linear { milliamps_per_volt: f64 },
    Failing,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HardwareState {
    pub outputs: BTreeSet<PinIndex>,
    pub frequencies: BTreeMap<PinIndex, f64>,
    pub duty: BTreeMap<PinIndex, u64>,
    pub duty_log: Vec<(PinIndex, u64)>,
    pub adc_enabled: BTreeSet<PinIndex>,
    pub reads: usize,
}

impl HardwareState {
    /// true when nothing has been configured, driven or sampled
    pub fn untouched(&self) -> bool {
        *self == HardwareState::default()
    }

    pub fn last_duty(&self) -> Option<u64> {
        self.duty_log.last().map(|(_, duty)| *duty)
    }

    pub fn applied_duties(&self) -> Vec<u64> {
        self.duty_log.iter().map(|(_, duty)| *duty).collect()
    }
}

pub struct MockPwm {
    state: Rc<RefCell<HardwareState>>,
}

impl PwmBase for MockPwm {
    fn configure_output(&mut self, pin: PinIndex) {
        self.state.borrow_mut().outputs.insert(pin);
    }

    fn set_frequency(&mut self, pin: PinIndex, frequency: Frequency) {
        self.state
            .borrow_mut()
            .frequencies
            .insert(pin, frequency.as_hertz());
    }

    fn get_max_duty(&self) -> u64 {
        MOCK_MAX_DUTY
    }

    fn set_duty(&mut self, pin: PinIndex, duty_cycle: u64) {
        let mut state = self.state.borrow_mut();
        state.duty.insert(pin, duty_cycle);
        state.duty_log.push((pin, duty_cycle));
    }
}

pub struct MockAdc {
    state: Rc<RefCell<HardwareState>>,
    model: SensorModel,
}

impl MockAdc {
    fn sample(&self, state: &HardwareState) -> Result<u16, AdcError> {
        match self.model {
            SensorModel::Constant(value) => Ok(value),
            SensorModel::Failing => Err(AdcError::Hardware),
            SensorModel::Linear { milliamps_per_volt } => {
                let duty = state.last_duty().unwrap_or(0) as f64;
                let volts = duty / MOCK_MAX_DUTY as f64 * MOCK_SUPPLY_VOLTS;
                let milliamps = (milliamps_per_volt * volts).clamp(0.0, MOCK_FULL_SCALE_MA);
                let full_scale = Resolution::BITS10.full_scale() as f64;
                Ok(round(milliamps / MOCK_FULL_SCALE_MA * full_scale) as u16)
            }
        }
    }
}

impl AdcBase for MockAdc {
    fn enable(&mut self, pin: PinIndex) {
        self.state.borrow_mut().adc_enabled.insert(pin);
    }

    fn resolution(&self) -> Resolution {
        Resolution::BITS10
    }

    fn read(&mut self, pin: PinIndex) -> impl Future<Output = Result<u16, AdcError>> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        let result = if state.adc_enabled.contains(&pin) {
            self.sample(&state)
        } else {
            Err(AdcError::PinNotEnabled)
        };
        core::future::ready(result)
    }
}

/// PWM and ADC sharing the same recorded state.
pub fn mock_hardware(model: SensorModel) -> (MockPwm, MockAdc, Rc<RefCell<HardwareState>>) {
    let state = Rc::new(RefCell::new(HardwareState::default()));
    let pwm = MockPwm {
        state: state.clone(),
    };
    let adc = MockAdc {
        state: state.clone(),
        model,
    };
    (pwm, adc, state)
}

/// Clock that only moves when a sleep on it completes.
#[derive(Default)]
pub struct MockTimer {
    now: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl MockTimer {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl TimerBase for MockTimer {
    fn now(&self) -> Duration {
        self.now.get()
    }

    // time moves only when the sleep is polled to completion, a cancelled sleep
    // leaves the clock where it was
    fn after(&self, duration: Duration) -> impl Future<Output = ()> {
        async move {
            self.now.set(self.now.get() + duration);
            self.sleeps.borrow_mut().push(duration);
        }
    }
}

/// Fires on the n-th wait, i.e. during the n-th settling pause of a run.
pub struct AbortAfter {
    remaining: usize,
}

impl AbortAfter {
    pub fn new(waits: usize) -> Self {
        Self { remaining: waits }
    }
}

impl AbortSignal for AbortAfter {
    fn wait(&mut self) -> impl Future<Output = ()> {
        self.remaining = self.remaining.saturating_sub(1);
        let fire = self.remaining == 0;
        async move {
            if !fire {
                core::future::pending::<()>().await;
            }
        }
    }
}
