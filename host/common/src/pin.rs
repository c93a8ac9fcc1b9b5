use core::str::FromStr;

const PINS_PER_PORT: i32 = 16;

/// Pin number as written in a command: either a raw number (`16`) or a port name (`PB0`).
/// Ports are laid out 16 pins apart, so `PB0` and `16` select the same pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinSelector(i32);

pub const PA0: PinSelector = PinSelector::from_port(b'A', 0);
pub const PB0: PinSelector = PinSelector::from_port(b'B', 0);

impl PinSelector {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn from_port(port: u8, pin: u8) -> Self {
        Self((port - b'A') as i32 * PINS_PER_PORT + pin as i32)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl FromStr for PinSelector {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        match bytes {
            [b'P' | b'p', port, rest @ ..] if port.is_ascii_alphabetic() && !rest.is_empty() => {
                let port = port.to_ascii_uppercase();
                // the first two bytes are ascii, index 2 is a char boundary
                let pin = s[2..].parse::<u8>().map_err(|_| ())?;
                if pin as i32 >= PINS_PER_PORT {
                    return Err(());
                }
                Ok(Self::from_port(port, pin))
            }
            _ => s.parse::<i32>().map(Self).map_err(|_| ()),
        }
    }
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for PinSelector {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "pin {}", self.0)
    }
}

/// Position of a pin inside the board pin table. Always non negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PinIndex(u16);

impl PinIndex {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn as_usize(&self) -> usize {
        usize::from(self.0)
    }
}

impl TryFrom<i32> for PinIndex {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u16::try_from(value).map(Self).map_err(|_| ())
    }
}

impl From<PinIndex> for i32 {
    fn from(value: PinIndex) -> Self {
        i32::from(value.0)
    }
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for PinIndex {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0)
    }
}
