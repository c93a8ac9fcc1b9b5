use core::{str::FromStr, time::Duration};

use common::{PinSelector, PlatingArgs};
use heapless::{LinearMap, String, Vec};
use math::measurements::{Current, Frequency, Voltage};

const MAX_LINE_LEN: usize = 64;
const MAX_TOKENS: usize = 16;
const UNRESOLVED_PIN: PinSelector = PinSelector::new(-1);

type Tokens<'a> = LinearMap<&'a str, &'a str, MAX_TOKENS>;

pub enum GCommandType {
    G,
    M,
}

#[derive(PartialEq, Debug, Copy, Clone)]
pub enum GCommand {
    // quick stop, aborts the running job
    M410,
    // electroplating
    // A<pin> anode, S<pin> sensor, I<mA> target current, D<V> step size, F<Hz> pwm frequency, T<ms> duration
    M10026(PlatingArgs),
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for GCommand {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            GCommand::M410 => defmt::write!(fmt, "M410"),
            GCommand::M10026(args) => defmt::write!(
                fmt,
                "M10026 [a: {}] [s: {}] [i: {}] [d: {}] [f: {}] [t: {}]",
                args.anode,
                args.sensor,
                args.target_current.map(|c| c.as_milliamperes()),
                args.step_size.map(|v| v.as_volts()),
                args.pwm_frequency.map(|f| f.as_hertz()),
                args.duration.map(|d| d.as_millis() as u64)
            ),
        }
    }
}

// nan and infinities never make a valid word
fn extract_token_as_number(cmd: &Tokens, key: &str) -> Option<f64> {
    cmd.get(key)
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

// integer words drop the fractional part, "20.7" reads as 20
fn extract_token_as_integer(cmd: &Tokens, key: &str) -> Option<i64> {
    extract_token_as_number(cmd, key).map(|value| value as i64)
}

// a number outside the i32 range can't name any pin: it becomes a selector that
// no pin table resolves, instead of wrapping onto a real pin
fn extract_pin(cmd: &Tokens, key: &str) -> Option<PinSelector> {
    let token = cmd.get(key)?;
    PinSelector::from_str(token).ok().or_else(|| {
        extract_token_as_integer(cmd, key).map(|value| {
            i32::try_from(value)
                .map(PinSelector::new)
                .unwrap_or(UNRESOLVED_PIN)
        })
    })
}

fn extract_current(cmd: &Tokens, key: &str) -> Option<Current> {
    extract_token_as_integer(cmd, key).map(|value| Current::from_milliamperes(value as f64))
}

// step size and frequency must be positive, anything else falls back to the default
fn extract_voltage(cmd: &Tokens, key: &str) -> Option<Voltage> {
    extract_token_as_number(cmd, key)
        .filter(|value| *value > 0.0)
        .map(Voltage::from_volts)
}

fn extract_frequency(cmd: &Tokens, key: &str) -> Option<Frequency> {
    extract_token_as_integer(cmd, key)
        .filter(|value| *value > 0)
        .map(|value| Frequency::from_hertz(value as f64))
}

fn extract_duration(cmd: &Tokens, key: &str) -> Option<Duration> {
    let value = extract_token_as_integer(cmd, key)?;
    u64::try_from(value).ok().map(Duration::from_millis)
}

fn get_command_type(cmd: &Tokens) -> Option<(GCommandType, u64)> {
    match extract_token_as_number(cmd, "G") {
        Some(code) => Some((GCommandType::G, code as u64)),
        None => extract_token_as_number(cmd, "M").map(|code| (GCommandType::M, code as u64)),
    }
}

enum ParserState {
    ReadingCommand,
    // ( ... )
    ReadingComment,
    // ; up to the end of the line
    ReadingLineComment,
}

pub struct GCodeParser {}

impl Default for GCodeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl GCodeParser {
    pub const fn new() -> Self {
        Self {}
    }

    pub fn parse(&self, data: &str) -> Option<GCommand> {
        let mut state = ParserState::ReadingCommand;
        let mut data_buffer: String<MAX_LINE_LEN> = String::new();
        for b in data.chars() {
            if b == '\n' {
                break;
            }
            match state {
                ParserState::ReadingCommand => match b {
                    ';' => state = ParserState::ReadingLineComment,
                    '(' => state = ParserState::ReadingComment,
                    '\r' => (),
                    _ => data_buffer.push(b).ok()?,
                },
                ParserState::ReadingComment => {
                    if b == ')' {
                        state = ParserState::ReadingCommand
                    }
                }
                ParserState::ReadingLineComment => (),
            }
        }
        self.parse_line(data_buffer.as_str())
    }

    pub fn parse_line(&self, line: &str) -> Option<GCommand> {
        let tokens: Vec<&str, MAX_TOKENS> = line
            .split(' ')
            .filter(|t| !t.is_empty())
            .take(MAX_TOKENS)
            .collect();
        if tokens.is_empty() {
            return None;
        }
        // cmd is a command
        let mut cmd: Tokens = LinearMap::new();

        for t in tokens {
            let key = t.get(0..1)?;
            let v = t.get(1..)?;
            cmd.insert(key, v).ok()?;
        }

        let (t, code) = get_command_type(&cmd)?;
        match (t, code) {
            (GCommandType::M, 410) => Some(GCommand::M410),
            (GCommandType::M, 10026) => Some(GCommand::M10026(PlatingArgs {
                anode: extract_pin(&cmd, "A"),
                sensor: extract_pin(&cmd, "S"),
                target_current: extract_current(&cmd, "I"),
                step_size: extract_voltage(&cmd, "D"),
                pwm_frequency: extract_frequency(&cmd, "F"),
                duration: extract_duration(&cmd, "T"),
            })),
            _ => None,
        }
    }
}
