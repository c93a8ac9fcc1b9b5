#![no_std]
#![no_main]

use core::future::Future;

use common::{
    AbortSignal, AdcBase, AdcError, PinIndex, PinMap, PinSelector, PwmBase, TimerBase,
};
use config::{
    PinFunction, MAX_ANALOG_PINS, MAX_PWM_FREQUENCY_HZ, MIN_PWM_FREQUENCY_HZ, PIN_TABLE,
};
use embassy_stm32::{
    adc::{Adc, AnyAdcChannel, Instance, RxDma, SampleTime},
    time::Hertz,
    timer::{simple_pwm::SimplePwm, Channel, GeneralInstance4Channel},
};
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::Channel as MessageChannel,
    signal::Signal,
};
use embassy_time::{Instant, Timer};
use heapless::{String, Vec};
use math::{measurements::Frequency, Resolution};

pub mod config;

pub type DmaBufType = [u16; 1];

/// Pin table of the board, see [`config::PIN_TABLE`].
pub struct BoardPinMap;

impl PinMap for BoardPinMap {
    fn pin_index(&self, selector: PinSelector) -> i32 {
        PIN_TABLE
            .iter()
            .position(|entry| entry.selector == selector)
            .map_or(-1, |index| index as i32)
    }

    fn is_pwm_pin(&self, pin: PinIndex) -> bool {
        pwm_channel(pin).is_some()
    }
}

pub fn pwm_channel(pin: PinIndex) -> Option<Channel> {
    match PIN_TABLE.get(pin.as_usize())?.function {
        PinFunction::Pwm(channel) => Some(channel),
        _ => None,
    }
}

/// Carrier frequency the anode timer can actually produce.
pub fn pwm_frequency_hz(frequency: Frequency) -> u32 {
    let hz = frequency.as_hertz();
    if !hz.is_finite() {
        return MIN_PWM_FREQUENCY_HZ;
    }
    (hz as u32).clamp(MIN_PWM_FREQUENCY_HZ, MAX_PWM_FREQUENCY_HZ)
}

fn is_analog_pin(pin: PinIndex) -> bool {
    matches!(
        PIN_TABLE.get(pin.as_usize()).map(|entry| entry.function),
        Some(PinFunction::Analog)
    )
}

#[macro_export]
macro_rules! task_write {
    ($dst: expr, $label: expr, $fmt: expr, $($tokens:tt)*) => {
        {
            let time = embassy_time::Instant::now().as_millis();
             core::write!(
                $dst,
                "[{}] [{}] {}",
                time,
                $label,
                core::format_args!($fmt, $($tokens)*)
            )
        }
    };
}

pub struct SimplePwmWrapper<'a, T: GeneralInstance4Channel> {
    inner: SimplePwm<'a, T>,
}

impl<'a, T: GeneralInstance4Channel> SimplePwmWrapper<'a, T> {
    pub fn new(p: SimplePwm<'a, T>) -> Self {
        Self { inner: p }
    }
}

impl<T: GeneralInstance4Channel> PwmBase for SimplePwmWrapper<'_, T> {
    fn configure_output(&mut self, pin: PinIndex) {
        if let Some(channel) = pwm_channel(pin) {
            self.inner.set_duty(channel, 0);
            self.inner.enable(channel);
        }
    }

    // every channel of the timer shares the same period
    fn set_frequency(&mut self, _pin: PinIndex, frequency: Frequency) {
        self.inner.set_frequency(Hertz(pwm_frequency_hz(frequency)));
    }

    fn get_max_duty(&self) -> u64 {
        u64::from(self.inner.get_max_duty())
    }

    fn set_duty(&mut self, pin: PinIndex, duty_cycle: u64) {
        if let Some(channel) = pwm_channel(pin) {
            let duty_cycle = duty_cycle.min(self.get_max_duty()) as u32;
            self.inner.set_duty(channel, duty_cycle);
        }
    }
}

fn adc_resolution(resolution: Resolution) -> embassy_stm32::adc::Resolution {
    match resolution {
        Resolution::BITS16 => embassy_stm32::adc::Resolution::BITS16,
        Resolution::BITS14 => embassy_stm32::adc::Resolution::BITS14,
        Resolution::BITS12 => embassy_stm32::adc::Resolution::BITS12,
        Resolution::BITS10 => embassy_stm32::adc::Resolution::BITS10,
        Resolution::BITS8 => embassy_stm32::adc::Resolution::BITS8,
    }
}

/// ADC sampled through DMA, one conversion per read.
pub struct AdcWrapper<'a, T: Instance, D: RxDma<T>> {
    inner: Adc<'a, T>,
    dma: D,
    resolution: Resolution,
    sample_time: SampleTime,
    readings: &'a mut DmaBufType,
    channels: Vec<(PinIndex, AnyAdcChannel<T>), MAX_ANALOG_PINS>,
    enabled: Vec<PinIndex, MAX_ANALOG_PINS>,
}

impl<'a, T: Instance, D: RxDma<T>> AdcWrapper<'a, T, D> {
    pub fn new(
        mut adc: Adc<'a, T>,
        dma: D,
        resolution: Resolution,
        sample_time: SampleTime,
        readings: &'a mut DmaBufType,
    ) -> Self {
        adc.set_resolution(adc_resolution(resolution));
        adc.set_sample_time(sample_time);
        Self {
            inner: adc,
            dma,
            resolution,
            sample_time,
            readings,
            channels: Vec::new(),
            enabled: Vec::new(),
        }
    }

    /// Binds the analog input wired to `selector`. Fails when the selector is not an
    /// analog pin of the board or every slot is taken.
    pub fn attach(&mut self, selector: PinSelector, channel: AnyAdcChannel<T>) -> Result<(), ()> {
        let pin = PinIndex::try_from(BoardPinMap.pin_index(selector))?;
        if !is_analog_pin(pin) {
            return Err(());
        }
        self.channels.push((pin, channel)).map_err(|_| ())
    }
}

impl<T: Instance, D: RxDma<T>> AdcBase for AdcWrapper<'_, T, D> {
    fn enable(&mut self, pin: PinIndex) {
        let attached = self.channels.iter().any(|(p, _)| *p == pin);
        if attached && !self.enabled.contains(&pin) {
            // there is a slot for every attached channel
            self.enabled.push(pin).ok();
        }
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    async fn read(&mut self, pin: PinIndex) -> Result<u16, AdcError> {
        if !self.enabled.contains(&pin) {
            return Err(AdcError::PinNotEnabled);
        }
        let (_, channel) = self
            .channels
            .iter_mut()
            .find(|(p, _)| *p == pin)
            .ok_or(AdcError::Hardware)?;
        self.inner
            .read(
                &mut self.dma,
                [(channel, self.sample_time)].into_iter(),
                &mut self.readings[..],
            )
            .await;
        Ok(self.readings[0])
    }
}

pub struct BoardTimer;

impl TimerBase for BoardTimer {
    fn now(&self) -> core::time::Duration {
        core::time::Duration::from_micros(Instant::now().as_micros())
    }

    async fn after(&self, duration: core::time::Duration) {
        let duration = embassy_time::Duration::from_micros(duration.as_micros() as u64);
        Timer::after(duration).await
    }
}

/// Stop request shared between the command dispatcher and the plating task.
pub struct SignalAbort<'a, M: RawMutex> {
    signal: &'a Signal<M, ()>,
}

impl<'a, M: RawMutex> SignalAbort<'a, M> {
    /// Drops any stop request left over from a previous job.
    pub fn new(signal: &'a Signal<M, ()>) -> Self {
        signal.reset();
        Self { signal }
    }
}

impl<M: RawMutex> AbortSignal for SignalAbort<'_, M> {
    fn wait(&mut self) -> impl Future<Output = ()> {
        self.signal.wait()
    }
}

/// Line oriented sink: every complete line is queued on `channel` for the UART.
/// Lines are dropped when the queue is full, the job is never stalled by the host.
pub struct FeedbackWriter<'a, M: RawMutex, const N: usize, const L: usize> {
    channel: &'a MessageChannel<M, String<N>, L>,
    line: String<N>,
}

impl<'a, M: RawMutex, const N: usize, const L: usize> FeedbackWriter<'a, M, N, L> {
    pub fn new(channel: &'a MessageChannel<M, String<N>, L>) -> Self {
        Self {
            channel,
            line: String::new(),
        }
    }

    fn flush(&mut self) {
        self.channel.try_send(self.line.clone()).unwrap_or(());
        self.line.clear();
    }
}

impl<M: RawMutex, const N: usize, const L: usize> core::fmt::Write for FeedbackWriter<'_, M, N, L> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.line.push(c).is_err() {
                self.flush();
                self.line.push(c).map_err(|_| core::fmt::Error)?;
            }
            if c == '\n' {
                self.flush();
            }
        }
        Ok(())
    }
}
