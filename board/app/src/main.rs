#![no_std]
#![no_main]

use core::fmt::Write;

use app::config::UART_BAUDRATE;
use app::{
    task_write, AdcWrapper, BoardPinMap, BoardTimer, DmaBufType, FeedbackWriter, SignalAbort,
    SimplePwmWrapper,
};
use common::pin::PinSelector;
use electroplating::{ControlParameters, Electroplater};
use embassy_executor::Spawner;
use embassy_stm32::adc::{Adc, AdcChannel, AnyAdcChannel, SampleTime};
use embassy_stm32::bind_interrupts;
use embassy_stm32::gpio::OutputType;
use embassy_stm32::mode::Async;
use embassy_stm32::peripherals::{ADC1, DMA1_CH2, TIM5, UART4};
use embassy_stm32::time::khz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::usart::{self, Uart, UartRx, UartTx};
use embassy_stm32::Config;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_sync::{blocking_mutex::raw::ThreadModeRawMutex, channel::Channel};
use embassy_time::{Duration, Timer};
use heapless::String;
use math::Resolution;
use parser::gcode::{GCodeParser, GCommand};
use static_cell::ConstStaticCell;

use {defmt_rtt as _, panic_probe as _};

#[cfg(feature = "defmt-log")]
use defmt::{error, info, warn};

const MAX_MESSAGE_LEN: usize = 255;
const COMMAND_DISPATCHER_CHANNEL_LEN: usize = 8;
const PLATING_CHANNEL_LEN: usize = 1;
const FEEDBACK_CHANNEL_LEN: usize = 16;

const DISPATCHER_LABEL: &'_ str = "DISPATCHER";

type BoardElectroplater = Electroplater<
    BoardPinMap,
    SimplePwmWrapper<'static, TIM5>,
    AdcWrapper<'static, ADC1, DMA1_CH2>,
    BoardTimer,
>;

static COMMAND_DISPATCHER_CHANNEL: Channel<
    ThreadModeRawMutex,
    String<MAX_MESSAGE_LEN>,
    COMMAND_DISPATCHER_CHANNEL_LEN,
> = Channel::new();
static PLATING_CHANNEL: Channel<ThreadModeRawMutex, ControlParameters, PLATING_CHANNEL_LEN> =
    Channel::new();
static FEEDBACK_CHANNEL: Channel<
    ThreadModeRawMutex,
    String<MAX_MESSAGE_LEN>,
    FEEDBACK_CHANNEL_LEN,
> = Channel::new();
// raised by M410
static STOP_SIGNAL: Signal<ThreadModeRawMutex, ()> = Signal::new();

static UART_RX: Mutex<ThreadModeRawMutex, Option<UartRx<'_, Async>>> = Mutex::new(None);
static UART_TX: Mutex<ThreadModeRawMutex, Option<UartTx<'_, Async>>> = Mutex::new(None);

#[link_section = ".ram_d3"]
static UART_RX_DMA_BUF: ConstStaticCell<[u8; MAX_MESSAGE_LEN]> =
    ConstStaticCell::new([0u8; MAX_MESSAGE_LEN]);
#[link_section = ".ram_d3"]
static UART_TX_DMA_BUF: ConstStaticCell<[u8; MAX_MESSAGE_LEN]> =
    ConstStaticCell::new([0u8; MAX_MESSAGE_LEN]);
#[link_section = ".ram_d3"]
static SENSOR_DMA_BUF: ConstStaticCell<DmaBufType> = ConstStaticCell::new([0u16; 1]);

bind_interrupts!(struct Irqs {
    UART4 => usart::InterruptHandler<UART4>;
});

#[embassy_executor::task]
async fn input_handler() {
    let mut msg: String<MAX_MESSAGE_LEN> = String::new();
    let tmp = UART_RX_DMA_BUF.take();
    let mut rx = UART_RX.lock().await;
    let rx = rx.as_mut().expect("UART RX not initialized");
    let dt = Duration::from_millis(50);

    #[cfg(feature = "defmt-log")]
    info!("Starting input handler loop");

    loop {
        match rx.read_until_idle(tmp).await {
            Ok(n) => {
                for b in &tmp[0..n] {
                    if *b == b'\n' {
                        COMMAND_DISPATCHER_CHANNEL.send(msg.clone()).await;
                        #[cfg(feature = "defmt-log")]
                        info!("[INPUT_HANDLER] {}", msg.as_str());
                        msg.clear();
                    } else if msg.push((*b).into()).is_err() {
                        msg.clear();
                        #[cfg(feature = "defmt-log")]
                        error!("Message too long");
                    }
                }
            }
            Err(e) => {
                #[cfg(feature = "defmt-log")]
                error!("Cannot read from UART: {}", e);
            }
        }
        Timer::after(dt).await;
    }
}

#[embassy_executor::task]
async fn output_handler() {
    let tmp = UART_TX_DMA_BUF.take();
    let mut tx = UART_TX.lock().await;
    let tx = tx.as_mut().expect("UART TX not initialized");

    loop {
        // copy the message inside the DMA shared memory before sending it over UART
        let msg = FEEDBACK_CHANNEL.receive().await;
        let len = msg.as_bytes().len().min(MAX_MESSAGE_LEN);
        tmp[0..len].copy_from_slice(&msg.as_bytes()[0..len]);
        if tx.write(&tmp[0..len]).await.is_err() {
            #[cfg(feature = "defmt-log")]
            error!("Cannot write to UART")
        }
    }
}

#[embassy_executor::task]
async fn command_dispatcher_task() {
    let parser = GCodeParser::new();
    let mut report: String<MAX_MESSAGE_LEN> = String::new();
    #[cfg(feature = "defmt-log")]
    info!("Starting command dispatcher loop");

    loop {
        let msg = COMMAND_DISPATCHER_CHANNEL.receive().await;
        #[cfg(feature = "defmt-log")]
        info!("[COMMAND DISPATCHER] received message {}", msg.as_str());
        match parser.parse(msg.as_str()) {
            Some(GCommand::M410) => {
                #[cfg(feature = "defmt-log")]
                warn!("[COMMAND DISPATCHER] quickstop");
                STOP_SIGNAL.signal(());
            }
            Some(GCommand::M10026(args)) => {
                if PLATING_CHANNEL.try_send(ControlParameters::resolve(&args)).is_err() {
                    report.clear();
                    task_write!(&mut report, DISPATCHER_LABEL, "{}\n", "Electroplating busy")
                        .unwrap_or(());
                    FEEDBACK_CHANNEL.try_send(report.clone()).unwrap_or(());
                }
            }
            None => {
                #[cfg(feature = "defmt-log")]
                error!("[COMMAND DISPATCHER] Invalid command");
            }
        }
    }
}

#[embassy_executor::task]
async fn plating_handler(mut plater: BoardElectroplater) {
    #[cfg(feature = "defmt-log")]
    info!("Starting plating loop");

    loop {
        let params = PLATING_CHANNEL.receive().await;
        let mut abort = SignalAbort::new(&STOP_SIGNAL);
        let mut out = FeedbackWriter::new(&FEEDBACK_CHANNEL);
        match plater.run(&params, &mut abort, &mut out).await {
            Ok(_summary) => {
                #[cfg(feature = "defmt-log")]
                info!(
                    "[PLATING] {} iterations, aborted: {}",
                    _summary.iterations,
                    _summary.aborted
                );
            }
            Err(_e) => {
                #[cfg(feature = "defmt-log")]
                error!("[PLATING] {}", _e);
            }
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config = Config::default();

    // ADC kernel clock from PLL2, as in the embassy stm32h7 ADC examples
    {
        use embassy_stm32::rcc::*;
        config.rcc.hsi = Some(HSIPrescaler::DIV1);
        config.rcc.csi = true;
        config.rcc.pll1 = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL50,
            divp: Some(PllDiv::DIV2),
            divq: Some(PllDiv::DIV8),
            divr: None,
        });
        config.rcc.pll2 = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL50,
            divp: Some(PllDiv::DIV8), // 100mhz
            divq: None,
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P; // 400 Mhz
        config.rcc.ahb_pre = AHBPrescaler::DIV2; // 200 Mhz
        config.rcc.apb1_pre = APBPrescaler::DIV2; // 100 Mhz
        config.rcc.apb2_pre = APBPrescaler::DIV2; // 100 Mhz
        config.rcc.apb3_pre = APBPrescaler::DIV2; // 100 Mhz
        config.rcc.apb4_pre = APBPrescaler::DIV2; // 100 Mhz
        config.rcc.voltage_scale = VoltageScale::Scale1;
        config.rcc.mux.adcsel = mux::Adcsel::PLL2_P;
    }
    let p = embassy_stm32::init(config);

    let mut uart_config = usart::Config::default();
    uart_config.baudrate = UART_BAUDRATE;

    let uart = Uart::new(
        p.UART4, p.PC11, p.PC10, Irqs, p.DMA1_CH0, p.DMA1_CH1, uart_config,
    )
    .expect("UART configuration not valid");

    let (tx, rx) = uart.split();

    {
        let mut uart_rx = UART_RX.lock().await;
        uart_rx.replace(rx);
    }

    {
        let mut uart_tx = UART_TX.lock().await;
        uart_tx.replace(tx);
    }

    let pwm = SimplePwm::new(
        p.TIM5,
        Some(PwmPin::new_ch1(p.PA0, OutputType::PushPull)),
        Some(PwmPin::new_ch2(p.PA1, OutputType::PushPull)),
        Some(PwmPin::new_ch3(p.PA2, OutputType::PushPull)),
        None,
        khz(1),
        CountingMode::EdgeAlignedUp,
    );
    let pwm = SimplePwmWrapper::new(pwm);

    let mut adc = AdcWrapper::new(
        Adc::new(p.ADC1),
        p.DMA1_CH2,
        Resolution::BITS12,
        SampleTime::CYCLES32_5,
        SENSOR_DMA_BUF.take(),
    );
    let analog_pins: [(PinSelector, AnyAdcChannel<ADC1>); 3] = [
        (PinSelector::from_port(b'B', 0), p.PB0.degrade_adc()),
        (PinSelector::from_port(b'B', 1), p.PB1.degrade_adc()),
        (PinSelector::from_port(b'C', 0), p.PC0.degrade_adc()),
    ];
    for (selector, channel) in analog_pins {
        adc.attach(selector, channel)
            .expect("Analog pin missing from the pin table");
    }

    let plater = Electroplater::new(BoardPinMap, pwm, adc, BoardTimer);

    spawner.spawn(input_handler()).unwrap();

    spawner.spawn(output_handler()).unwrap();

    spawner.spawn(command_dispatcher_task()).unwrap();

    spawner.spawn(plating_handler(plater)).unwrap();

    loop {
        #[cfg(feature = "defmt-log")]
        info!("[MAIN LOOP] alive");
        Timer::after(Duration::from_secs(5)).await;
    }
}
