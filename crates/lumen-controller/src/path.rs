//! Service sizing: bandwidth/modulation → slot count, slot range → frequency.
//!
//! The capacity table is fixed per transceiver generation. Frequencies sit
//! on the 50 GHz flex-grid anchored at 191.3 THz; the commanded carrier is
//! the center of the allocated range.

use lumen_common::models::SlotRange;

/// Low edge of the usable C-band grid, in THz.
pub const GRID_ANCHOR_THZ: f64 = 191.3;
/// Fixed slot width, in THz (50 GHz).
pub const SLOT_WIDTH_THZ: f64 = 0.05;

/// Slots required for a `{bandwidth, modulation}` service.
///
/// Returns `None` for combinations the transceivers cannot carry.
pub fn required_slots(bandwidth_gbps: u32, modulation: &str) -> Option<usize> {
    let slots = match (bandwidth_gbps, modulation.to_ascii_lowercase().as_str()) {
        (100, "dp-qpsk") => 4,
        (200, "dp-16qam") => 4,
        (200, "dp-qpsk") => 8,
        (400, "dp-16qam") => 8,
        (400, "dp-qpsk") => 16,
        (800, "dp-16qam") => 16,
        _ => return None,
    };
    Some(slots)
}

/// Default modulation per line rate.
pub fn default_modulation(bandwidth_gbps: u32) -> &'static str {
    match bandwidth_gbps {
        100 => "dp-qpsk",
        _ => "dp-16qam",
    }
}

/// Carrier frequency for an allocated slot range, in THz.
pub fn center_frequency(range: SlotRange) -> f64 {
    GRID_ANCHOR_THZ + SLOT_WIDTH_THZ * (range.start as f64 + range.count as f64 / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_table() {
        assert_eq!(required_slots(400, "DP-16QAM"), Some(8));
        assert_eq!(required_slots(100, "dp-qpsk"), Some(4));
        assert_eq!(required_slots(400, "dp-qpsk"), Some(16));
        assert_eq!(required_slots(400, "bpsk"), None);
        assert_eq!(required_slots(50, "dp-qpsk"), None);
    }

    #[test]
    fn default_modulations() {
        assert_eq!(default_modulation(100), "dp-qpsk");
        assert_eq!(default_modulation(400), "dp-16qam");
    }

    #[test]
    fn frequency_is_range_center() {
        let f = center_frequency(SlotRange { start: 0, count: 8 });
        assert!((f - 191.5).abs() < 1e-9);

        let f = center_frequency(SlotRange { start: 8, count: 8 });
        assert!((f - 191.9).abs() < 1e-9);
    }
}
