//! Reservoir low-water float switch schedule.

/// Hours at which the reservoir level is checked: start and end of day.
pub const FLOAT_SWITCH_CHECK_HOURS: [u8; 2] = [6, 18];

pub fn is_check_hour(hour: u8) -> bool {
    FLOAT_SWITCH_CHECK_HOURS.contains(&hour)
}

pub fn water_level_label(tripped: bool) -> &'static str {
    if tripped {
        "LOW"
    } else {
        "Normal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_only_at_six_and_eighteen() {
        let hours: Vec<u8> = (0..24).filter(|h| is_check_hour(*h)).collect();
        assert_eq!(hours, vec![6, 18]);
    }

    #[test]
    fn labels() {
        assert_eq!(water_level_label(true), "LOW");
        assert_eq!(water_level_label(false), "Normal");
    }
}
