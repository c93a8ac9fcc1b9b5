use core::{fmt::Display, time::Duration};

use math::common::clamp_voltage;
use math::measurements::{Current, Voltage};

/// One step of the bang-bang regulator.
///
/// The output is raised by `step` while the measured current is below the target,
/// lowered by `step` when it's above, and left alone when they match. The result
/// is clamped to `[0, supply]`.
pub fn correct_voltage(
    voltage: Voltage,
    measured: Current,
    target: Current,
    step: Voltage,
    supply: Voltage,
) -> Voltage {
    let measured = measured.as_amperes();
    let target = target.as_amperes();
    let corrected = if measured < target {
        voltage.as_volts() + step.as_volts()
    } else if measured > target {
        voltage.as_volts() - step.as_volts()
    } else {
        voltage.as_volts()
    };
    clamp_voltage(Voltage::from_volts(corrected), Voltage::from_volts(0.0), supply)
}

#[derive(Clone, Copy, Debug)]
pub struct LoopState {
    output_voltage: Voltage,
    iteration: u32,
    start: Duration,
}

impl LoopState {
    pub fn new(initial_voltage: Voltage, start: Duration) -> Self {
        Self {
            output_voltage: initial_voltage,
            iteration: 0,
            start,
        }
    }

    pub fn output_voltage(&self) -> Voltage {
        self.output_voltage
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.start)
    }

    pub fn correct(&mut self, measured: Current, target: Current, step: Voltage, supply: Voltage) {
        self.output_voltage = correct_voltage(self.output_voltage, measured, target, step, supply);
    }

    pub fn next_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn summary(&self, now: Duration, aborted: bool) -> RunSummary {
        RunSummary {
            iterations: self.iteration,
            output_voltage: self.output_voltage,
            elapsed: self.elapsed(now),
            aborted,
        }
    }
}

/// Progress line written after every sample.
#[derive(Clone, Copy, Debug)]
pub struct IterationRecord {
    pub iteration: u32,
    pub elapsed: Duration,
    pub current: Current,
    // voltage after the correction, applied in the next iteration
    pub output_voltage: Voltage,
    // duty cycle that was applied while the current was sampled
    pub duty_cycle: u64,
}

impl Display for IterationRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::write!(
            f,
            "Iteration {} ({} ms): {:.2} mA at {:.2} V (PWM {})",
            self.iteration,
            self.elapsed.as_millis(),
            self.current.as_milliamperes(),
            self.output_voltage.as_volts(),
            self.duty_cycle
        )
    }
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for IterationRecord {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "[iteration: {}] [{} ms] [{} mA] [{} V] [duty: {}]",
            self.iteration,
            self.elapsed.as_millis() as u64,
            self.current.as_milliamperes(),
            self.output_voltage.as_volts(),
            self.duty_cycle
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    pub iterations: u32,
    pub output_voltage: Voltage,
    pub elapsed: Duration,
    pub aborted: bool,
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const SUPPLY: f64 = 5.0;

    fn correct(voltage: f64, measured_ma: f64, target_ma: f64, step: f64) -> f64 {
        correct_voltage(
            Voltage::from_volts(voltage),
            Current::from_milliamperes(measured_ma),
            Current::from_milliamperes(target_ma),
            Voltage::from_volts(step),
            Voltage::from_volts(SUPPLY),
        )
        .as_volts()
    }

    #[test]
    fn test_correct_voltage_below_target() {
        assert_abs_diff_eq!(0.52, correct(0.5, 10.0, 20.0, 0.02), epsilon = 0.000001);
    }

    #[test]
    fn test_correct_voltage_above_target() {
        assert_abs_diff_eq!(0.48, correct(0.5, 30.0, 20.0, 0.02), epsilon = 0.000001);
    }

    #[test]
    fn test_correct_voltage_on_target() {
        assert_abs_diff_eq!(0.5, correct(0.5, 20.0, 20.0, 0.02), epsilon = 0.000001);
    }

    #[test]
    fn test_correct_voltage_clamped() {
        assert_abs_diff_eq!(5.0, correct(4.99, 0.0, 20.0, 0.02), epsilon = 0.000001);
        assert_abs_diff_eq!(5.0, correct(5.0, 0.0, 20.0, 0.5), epsilon = 0.000001);
        assert_abs_diff_eq!(0.0, correct(0.01, 500.0, 20.0, 0.02), epsilon = 0.000001);
        assert_abs_diff_eq!(0.0, correct(0.0, 500.0, 20.0, 0.02), epsilon = 0.000001);
    }

    #[test]
    fn test_loop_state() {
        let mut state = LoopState::new(Voltage::from_volts(0.5), Duration::from_millis(100));
        assert_eq!(0, state.iteration());
        assert_eq!(Duration::from_millis(50), state.elapsed(Duration::from_millis(150)));
        // clocks never run backwards, but the elapsed time must not underflow either
        assert_eq!(Duration::ZERO, state.elapsed(Duration::from_millis(10)));

        state.correct(
            Current::from_milliamperes(0.0),
            Current::from_milliamperes(20.0),
            Voltage::from_volts(0.02),
            Voltage::from_volts(SUPPLY),
        );
        state.next_iteration();
        assert_eq!(1, state.iteration());
        assert_abs_diff_eq!(0.52, state.output_voltage().as_volts(), epsilon = 0.000001);

        let summary = state.summary(Duration::from_millis(300), false);
        assert_eq!(1, summary.iterations);
        assert_eq!(Duration::from_millis(200), summary.elapsed);
        assert!(!summary.aborted);
    }

    #[test]
    fn test_iteration_record_display() {
        let record = IterationRecord {
            iteration: 3,
            elapsed: Duration::from_millis(150),
            current: Current::from_milliamperes(19.5),
            output_voltage: Voltage::from_volts(0.56),
            duty_cycle: 28,
        };
        assert_eq!(
            "Iteration 3 (150 ms): 19.50 mA at 0.56 V (PWM 28)",
            format!("{}", record)
        );
    }
}
