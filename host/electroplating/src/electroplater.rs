use core::fmt::Write;

#[cfg(feature = "defmt-log")]
use defmt::{debug, error, info, warn};
use futures::{
    future::{select, Either},
    pin_mut,
};

use common::{AbortSignal, AdcBase, PinMap, PwmBase, TimerBase};
use math::common::{compute_current, compute_duty_cycle};

use crate::{
    anode::EnergizedAnode,
    config::{ControlParameters, PlatingOptions},
    controller::{IterationRecord, LoopState, RunSummary},
    error::ElectroplatingError,
    hardware::{configure_pins, resolve_pins, PlatingPins},
};

/// Closed loop current regulator for an electroplating cell.
///
/// The anode is driven by a PWM output whose average voltage is nudged up or down
/// by a fixed step until the current measured on the sensor pin matches the target.
pub struct Electroplater<M: PinMap, P: PwmBase, A: AdcBase, T: TimerBase> {
    pin_map: M,
    pwm: P,
    adc: A,
    timer: T,
    options: PlatingOptions,
}

impl<M, P, A, T> Electroplater<M, P, A, T>
where
    M: PinMap,
    P: PwmBase,
    A: AdcBase,
    T: TimerBase,
{
    pub fn new(pin_map: M, pwm: P, adc: A, timer: T) -> Self {
        Self::with_options(pin_map, pwm, adc, timer, PlatingOptions::default())
    }

    pub fn with_options(pin_map: M, pwm: P, adc: A, timer: T, options: PlatingOptions) -> Self {
        Self {
            pin_map,
            pwm,
            adc,
            timer,
            options,
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Validates the pins of `params` and prepares them: anode as PWM output at the
    /// requested frequency, sensor as analog input. On error nothing is configured.
    pub fn configure(&mut self, params: &ControlParameters) -> Result<PlatingPins, ElectroplatingError> {
        let pins = resolve_pins(&self.pin_map, params)?;
        configure_pins(&pins, params.pwm_frequency, &mut self.pwm, &mut self.adc);
        #[cfg(feature = "defmt-log")]
        debug!("[ELECTROPLATING] configured {}", pins);
        Ok(pins)
    }

    /// Runs a full plating job, writing the settings, one line per iteration and a
    /// final `Done` to `out`. The loop ends once `params.duration` has elapsed or when
    /// `abort` fires; the anode is left at zero duty whichever way it ends.
    pub async fn run<S: AbortSignal, W: Write>(
        &mut self,
        params: &ControlParameters,
        abort: &mut S,
        out: &mut W,
    ) -> Result<RunSummary, ElectroplatingError> {
        let pins = match self.configure(params) {
            Ok(pins) => pins,
            Err(e) => {
                #[cfg(feature = "defmt-log")]
                error!("[ELECTROPLATING] {}", e);
                writeln!(out, "{}", e).ok();
                return Err(e);
            }
        };

        report_settings(out, &pins, params).ok();
        #[cfg(feature = "defmt-log")]
        info!("[ELECTROPLATING] start {}", params);

        match self.regulate(&pins, params, abort, out).await {
            Ok(summary) => {
                if summary.aborted {
                    #[cfg(feature = "defmt-log")]
                    warn!("[ELECTROPLATING] aborted after {} iterations", summary.iterations);
                    writeln!(out, "Electroplating aborted").ok();
                }
                #[cfg(feature = "defmt-log")]
                info!("[ELECTROPLATING] done in {} iterations", summary.iterations);
                writeln!(out, "Done").ok();
                Ok(summary)
            }
            Err(e) => {
                #[cfg(feature = "defmt-log")]
                error!("[ELECTROPLATING] {}", e);
                writeln!(out, "{}", e).ok();
                Err(e)
            }
        }
    }

    async fn regulate<S: AbortSignal, W: Write>(
        &mut self,
        pins: &PlatingPins,
        params: &ControlParameters,
        abort: &mut S,
        out: &mut W,
    ) -> Result<RunSummary, ElectroplatingError> {
        let options = self.options;
        let resolution = self.adc.resolution();
        let mut state = LoopState::new(options.initial_voltage, self.timer.now());
        let mut anode = EnergizedAnode::energize(&mut self.pwm, pins.anode);
        let max_duty = anode.max_duty();

        // the loop body runs at least once, even with a zero duration
        loop {
            let duty_cycle = compute_duty_cycle(state.output_voltage(), options.supply_voltage, max_duty);
            anode.set_duty(duty_cycle);

            let stop = abort.wait();
            let settle = self.timer.after(options.settling_interval);
            pin_mut!(stop, settle);
            if let Either::Left(_) = select(stop, settle).await {
                anode.release();
                return Ok(state.summary(self.timer.now(), true));
            }

            // an early return drops the anode guard, which zeroes the output
            let sample = self
                .adc
                .read(pins.sensor)
                .await
                .map_err(ElectroplatingError::SensorReadFailure)?;
            let current = compute_current(u64::from(sample), resolution, options.full_scale_current);
            state.correct(
                current,
                params.target_current,
                params.step_size,
                options.supply_voltage,
            );

            let elapsed = state.elapsed(self.timer.now());
            let record = IterationRecord {
                iteration: state.iteration(),
                elapsed,
                current,
                output_voltage: state.output_voltage(),
                duty_cycle,
            };
            #[cfg(feature = "defmt-log")]
            debug!("[ELECTROPLATING] {}", record);
            writeln!(out, "{}", record).ok();
            state.next_iteration();

            if elapsed >= params.duration {
                break;
            }
        }

        anode.release();
        Ok(state.summary(self.timer.now(), false))
    }
}

fn report_settings<W: Write>(
    out: &mut W,
    pins: &PlatingPins,
    params: &ControlParameters,
) -> core::fmt::Result {
    writeln!(out, "Electroplating Settings:")?;
    writeln!(out, "Anode Pin: {}", i32::from(pins.anode))?;
    writeln!(out, "Sensor Pin: {}", i32::from(pins.sensor))?;
    writeln!(out, "Target Current: {:.0} mA", params.target_current.as_milliamperes())?;
    writeln!(out, "Interval Size: {:.2} V", params.step_size.as_volts())?;
    writeln!(out, "PWM Frequency: {:.0} Hz", params.pwm_frequency.as_hertz())?;
    writeln!(out, "Time: {} ms", params.duration.as_millis())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use approx::assert_abs_diff_eq;
    use common::{NeverAbort, PinIndex, PinSelector};
    use math::measurements::{Current, Frequency, Voltage};

    use super::*;
    use crate::mock::{
        mock_hardware, AbortAfter, HardwareState, MockAdc, MockPinMap, MockPwm, MockTimer, SensorModel,
    };

    type MockPlater = Electroplater<MockPinMap, MockPwm, MockAdc, MockTimer>;

    fn plater(model: SensorModel) -> (MockPlater, Rc<RefCell<HardwareState>>) {
        let (pwm, adc, state) = mock_hardware(model);
        let plater = Electroplater::new(MockPinMap::default(), pwm, adc, MockTimer::default());
        (plater, state)
    }

    fn params(duration_ms: u64) -> ControlParameters {
        ControlParameters {
            anode: PinSelector::new(0),
            sensor: PinSelector::new(16),
            duration: Duration::from_millis(duration_ms),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_iterations() {
        let (mut plater, state) = plater(SensorModel::Constant(41));
        let mut out = String::new();
        let summary = plater.run(&params(200), &mut NeverAbort, &mut out).await.unwrap();

        assert_eq!(4, summary.iterations);
        assert!(!summary.aborted);
        assert_eq!(Duration::from_millis(200), summary.elapsed);
        assert_eq!(vec![Duration::from_millis(50); 4], plater.timer().sleeps());
        assert_eq!(4, state.borrow().reads);

        let duties = state.borrow().applied_duties();
        assert_eq!(5, duties.len());
        assert_eq!(26, duties[0]);
        assert_eq!(Some(0), state.borrow().last_duty());
        assert!(out.ends_with("Done\n"));
    }

    #[tokio::test]
    async fn test_run_zero_duration() {
        let (mut plater, state) = plater(SensorModel::Constant(41));
        let mut out = String::new();
        let summary = plater.run(&params(0), &mut NeverAbort, &mut out).await.unwrap();

        assert_eq!(1, summary.iterations);
        assert_eq!(1, state.borrow().reads);
        assert_eq!(Some(0), state.borrow().last_duty());
    }

    #[tokio::test]
    async fn test_run_report() {
        let (mut plater, _state) = plater(SensorModel::Constant(0));
        let mut out = String::new();
        plater.run(&params(100), &mut NeverAbort, &mut out).await.unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            vec![
                "Electroplating Settings:",
                "Anode Pin: 0",
                "Sensor Pin: 16",
                "Target Current: 20 mA",
                "Interval Size: 0.02 V",
                "PWM Frequency: 1000 Hz",
                "Time: 100 ms",
                "Iteration 0 (50 ms): 0.00 mA at 0.52 V (PWM 26)",
                "Iteration 1 (100 ms): 0.00 mA at 0.54 V (PWM 27)",
                "Done",
            ],
            lines
        );
    }

    #[tokio::test]
    async fn test_run_configures_pins() {
        let (mut plater, state) = plater(SensorModel::Constant(41));
        let mut out = String::new();
        let mut params = params(0);
        params.pwm_frequency = Frequency::from_hertz(250.0);
        plater.run(&params, &mut NeverAbort, &mut out).await.unwrap();

        let state = state.borrow();
        assert!(state.outputs.contains(&PinIndex::new(0)));
        assert_eq!(Some(&250.0), state.frequencies.get(&PinIndex::new(0)));
        assert!(state.adc_enabled.contains(&PinIndex::new(16)));
    }

    #[tokio::test]
    async fn test_run_invalid_anode() {
        let (mut plater, state) = plater(SensorModel::Constant(41));
        let mut out = String::new();
        let mut params = params(200);
        params.anode = PinSelector::new(99);
        let result = plater.run(&params, &mut NeverAbort, &mut out).await;

        assert_eq!(Some(ElectroplatingError::InvalidAnodePin), result.err());
        assert_eq!("Invalid Anode Pin\n", out);
        assert!(state.borrow().untouched());
        assert!(plater.timer().sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_run_anode_not_pwm() {
        let (mut plater, state) = plater(SensorModel::Constant(41));
        let mut out = String::new();
        let mut params = params(200);
        params.anode = PinSelector::new(10);
        let result = plater.run(&params, &mut NeverAbort, &mut out).await;

        assert_eq!(Some(ElectroplatingError::AnodeNotPwmCapable), result.err());
        assert_eq!("Anode Pin must be a PWM Pin\n", out);
        assert!(state.borrow().untouched());
    }

    #[tokio::test]
    async fn test_run_invalid_sensor() {
        let (mut plater, state) = plater(SensorModel::Constant(41));
        let mut out = String::new();
        let mut params = params(200);
        params.sensor = PinSelector::new(-4);
        let result = plater.run(&params, &mut NeverAbort, &mut out).await;

        assert_eq!(Some(ElectroplatingError::InvalidSensorPin), result.err());
        assert_eq!("Invalid Sensor Pin\n", out);
        assert!(state.borrow().untouched());
    }

    #[tokio::test]
    async fn test_run_sensor_failure() {
        let (mut plater, state) = plater(SensorModel::Failing);
        let mut out = String::new();
        let result = plater.run(&params(1000), &mut NeverAbort, &mut out).await;

        assert!(matches!(result, Err(ElectroplatingError::SensorReadFailure(_))));
        assert_eq!(Some(0), state.borrow().last_duty());
        assert!(out.ends_with("Sensor read failure\n"));
        assert!(!out.contains("Done"));
    }

    #[tokio::test]
    async fn test_run_abort() {
        let (mut plater, state) = plater(SensorModel::Constant(41));
        let mut out = String::new();
        let mut abort = AbortAfter::new(3);
        let summary = plater.run(&params(10_000), &mut abort, &mut out).await.unwrap();

        assert!(summary.aborted);
        assert_eq!(2, summary.iterations);
        // the third settle lost the race and never elapsed
        assert_eq!(Duration::from_millis(100), summary.elapsed);
        assert_eq!(vec![Duration::from_millis(50); 2], plater.timer().sleeps());
        assert_eq!(2, state.borrow().reads);
        assert_eq!(Some(0), state.borrow().last_duty());
        assert!(out.contains("Electroplating aborted\n"));
        assert!(out.ends_with("Done\n"));
    }

    #[tokio::test]
    async fn test_run_saturates_high() {
        // no current flows, the output climbs to the supply and stays there
        let (mut plater, state) = plater(SensorModel::Constant(0));
        let mut out = String::new();
        let summary = plater.run(&params(15_000), &mut NeverAbort, &mut out).await.unwrap();

        assert_abs_diff_eq!(5.0, summary.output_voltage.as_volts(), epsilon = 0.000001);
        let duties = state.borrow().applied_duties();
        assert_eq!(255, duties[duties.len() - 2]);
        assert!(duties.iter().all(|d| *d <= 255));
    }

    #[tokio::test]
    async fn test_run_saturates_low() {
        let (mut plater, state) = plater(SensorModel::Constant(1023));
        let mut out = String::new();
        let summary = plater.run(&params(2000), &mut NeverAbort, &mut out).await.unwrap();

        assert_abs_diff_eq!(0.0, summary.output_voltage.as_volts(), epsilon = 0.000001);
        let duties = state.borrow().applied_duties();
        assert_eq!(0, duties[duties.len() - 2]);
    }

    #[tokio::test]
    async fn test_run_converges() {
        let (mut plater, state) = plater(SensorModel::Linear {
            milliamps_per_volt: 10.0,
        });
        let mut out = String::new();
        let summary = plater.run(&params(10_000), &mut NeverAbort, &mut out).await.unwrap();

        // 20 mA are drawn at 2 V, i.e. around duty 102
        assert_abs_diff_eq!(2.0, summary.output_voltage.as_volts(), epsilon = 0.1);
        let duties = state.borrow().applied_duties();
        let settled = &duties[duties.len() - 21..duties.len() - 1];
        assert!(settled.iter().all(|d| (95..=107).contains(d)));
    }

    #[tokio::test]
    async fn test_run_custom_options() {
        let (pwm, adc, state) = mock_hardware(SensorModel::Constant(0));
        let options = PlatingOptions {
            supply_voltage: Voltage::from_volts(10.0),
            initial_voltage: Voltage::from_volts(5.0),
            settling_interval: Duration::from_millis(10),
            full_scale_current: Current::from_amperes(1.0),
        };
        let mut plater = Electroplater::with_options(MockPinMap::default(), pwm, adc, MockTimer::default(), options);
        let mut out = String::new();
        let summary = plater.run(&params(30), &mut NeverAbort, &mut out).await.unwrap();

        assert_eq!(3, summary.iterations);
        assert_eq!(vec![Duration::from_millis(10); 3], plater.timer().sleeps());
        assert_eq!(128, state.borrow().applied_duties()[0]);
    }
}
