//! Battery estimation from the peripheral's reported cell voltage.

/// Voltage treated as an empty cell
pub const EMPTY_VOLTS: f32 = 3.0;
/// Voltage treated as a full cell
pub const FULL_VOLTS: f32 = 4.2;

/// Map a voltage reading (e.g. `"3.87"`) to a charge percentage.
///
/// Linear between [`EMPTY_VOLTS`] and [`FULL_VOLTS`], clamped to 0..=100.
/// Returns `None` when the text is not a finite number.
pub fn percentage_from_voltage(text: &str) -> Option<u8> {
    let volts: f32 = text.trim().parse().ok()?;
    if !volts.is_finite() {
        return None;
    }

    let fraction = (volts - EMPTY_VOLTS) / (FULL_VOLTS - EMPTY_VOLTS);
    Some((fraction * 100.0).round().clamp(0.0, 100.0) as u8)
}

/// Display bucket for a percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    Empty,
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

impl BatteryLevel {
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0..=24 => Self::Empty,
            25..=49 => Self::Quarter,
            50..=74 => Self::Half,
            75..=99 => Self::ThreeQuarters,
            _ => Self::Full,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Empty => "Low",
            Self::Quarter => "25%+",
            Self::Half => "50%+",
            Self::ThreeQuarters => "75%+",
            Self::Full => "Full",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_readings() {
        assert_eq!(percentage_from_voltage("4.20"), Some(100));
        assert_eq!(percentage_from_voltage("3.70"), Some(58));
        assert_eq!(percentage_from_voltage("3.30"), Some(25));
    }

    #[test]
    fn test_clamps_out_of_range() {
        assert_eq!(percentage_from_voltage("4.35"), Some(100));
        assert_eq!(percentage_from_voltage("2.80"), Some(0));
        assert_eq!(percentage_from_voltage(" 3.60\n"), Some(50));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(percentage_from_voltage(""), None);
        assert_eq!(percentage_from_voltage("--"), None);
        assert_eq!(percentage_from_voltage("NaN"), None);
        assert_eq!(percentage_from_voltage("inf"), None);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(BatteryLevel::from_percentage(24), BatteryLevel::Empty);
        assert_eq!(BatteryLevel::from_percentage(25), BatteryLevel::Quarter);
        assert_eq!(BatteryLevel::from_percentage(50), BatteryLevel::Half);
        assert_eq!(BatteryLevel::from_percentage(75), BatteryLevel::ThreeQuarters);
        assert_eq!(BatteryLevel::from_percentage(100), BatteryLevel::Full);
    }
}
