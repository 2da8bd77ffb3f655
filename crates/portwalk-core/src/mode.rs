//! Line parameters of an open port

use std::fmt;

use crate::error::PortError;

/// Baud rate used when nothing else is configured
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = PortError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(PortError::InvalidMode(format!("{other} data bits"))),
        }
    }
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Number of stop bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

/// Flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Serial line configuration
///
/// Defaults to 9600 baud, 8 data bits, no parity, 1 stop bit and no flow
/// control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Mode {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for Mode {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
        }
    }
}

impl Mode {
    /// Default framing at the given baud rate
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    /// Check the combination is something a UART can produce.
    ///
    /// 1.5 stop bits only exist together with 5 data bits.
    pub fn validate(&self) -> Result<(), PortError> {
        if self.baud_rate == 0 {
            return Err(PortError::InvalidSpeed(self.baud_rate));
        }
        if self.stop_bits == StopBits::OnePointFive && self.data_bits != DataBits::Five {
            return Err(PortError::InvalidMode(format!(
                "1.5 stop bits require 5 data bits, got {}",
                self.data_bits.bits()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits.bits(),
            parity,
            stop
        )?;
        match self.flow_control {
            FlowControl::None => Ok(()),
            FlowControl::Software => f.write_str(" xon/xoff"),
            FlowControl::Hardware => f.write_str(" rts/cts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_9600_8n1() {
        let mode = Mode::default();
        assert_eq!(mode.baud_rate, 9600);
        assert_eq!(mode.data_bits, DataBits::Eight);
        assert_eq!(mode.parity, Parity::None);
        assert_eq!(mode.stop_bits, StopBits::One);
        assert_eq!(mode.flow_control, FlowControl::None);
        assert_eq!(mode.to_string(), "9600 8N1");
    }

    #[test]
    fn zero_baud_is_invalid_speed() {
        let err = Mode::with_baud_rate(0).validate().unwrap_err();
        assert!(matches!(err, PortError::InvalidSpeed(0)));
    }

    #[test]
    fn one_and_a_half_stop_bits_need_five_data_bits() {
        let mut mode = Mode {
            stop_bits: StopBits::OnePointFive,
            ..Default::default()
        };
        assert!(matches!(mode.validate(), Err(PortError::InvalidMode(_))));

        mode.data_bits = DataBits::Five;
        assert!(mode.validate().is_ok());
        assert_eq!(mode.to_string(), "9600 5N1.5");
    }

    #[test]
    fn data_bits_from_number() {
        assert_eq!(DataBits::try_from(7).unwrap(), DataBits::Seven);
        assert!(DataBits::try_from(9).is_err());
    }

    #[test]
    fn flow_control_shows_in_display() {
        let mode = Mode {
            baud_rate: 115_200,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
            flow_control: FlowControl::Hardware,
            ..Default::default()
        };
        assert_eq!(mode.to_string(), "115200 8E2 rts/cts");
    }
}
