#![cfg_attr(not(test), no_std)]

pub use measurements;

pub mod common;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Resolution {
    BITS16,
    BITS14,
    BITS12,
    BITS10,
    BITS8,
}

impl Resolution {
    // highest code the converter can return, e.g. 1023 for a 10 bit ADC
    pub fn full_scale(&self) -> u64 {
        u64::from(*self) - 1
    }
}

impl From<Resolution> for u64 {
    fn from(value: Resolution) -> Self {
        match value {
            Resolution::BITS16 => 1 << 16,
            Resolution::BITS14 => 1 << 14,
            Resolution::BITS12 => 1 << 12,
            Resolution::BITS10 => 1 << 10,
            Resolution::BITS8 => 1 << 8,
        }
    }
}

#[cfg(feature = "defmt-log")]
impl defmt::Format for Resolution {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{} bits", u64::from(*self).trailing_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_steps() {
        assert_eq!(1024, u64::from(Resolution::BITS10));
        assert_eq!(4096, u64::from(Resolution::BITS12));
    }

    #[test]
    fn test_resolution_full_scale() {
        assert_eq!(1023, Resolution::BITS10.full_scale());
        assert_eq!(255, Resolution::BITS8.full_scale());
        assert_eq!(65535, Resolution::BITS16.full_scale());
    }
}
