pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{FinalStatus, TimerController, Visibility};
pub use state::{TimerState, TimerStatus};

/// `HH:MM:SS`, hours wrapping at 24 like a wall clock.
pub fn format_elapsed(elapsed_ms: u64) -> String {
    let total_secs = elapsed_ms / 1_000;
    let seconds = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = (total_secs / 3_600) % 24;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::format_elapsed;

    #[test]
    fn formats_and_wraps() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(65_999), "00:01:05");
        assert_eq!(format_elapsed(8 * 3_600_000 + 1_000), "08:00:01");
        assert_eq!(format_elapsed(25 * 3_600_000), "01:00:00");
    }
}
