//! Synthetic bus traffic against a live monitor.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use powermon::{BusAddress, BusWord, PowerMonitor, QueueSampler};

use crate::report::print_report;

/// Mains half-cycle at 60 Hz.
const HALF_CYCLE: Duration = Duration::from_micros(8333);

/// Run the monitor against a deterministic synthetic traffic pattern.
///
/// Per half-cycle the producer emits one zero-cross marker, one triac word
/// for all five channels `gi_delay_us` after the marker, one lamp
/// column/row pair with a slowly rotating pattern, and a solenoid write
/// roughly twice a second. The producer runs on the main thread; the
/// decoder runs on the monitor's own thread, exactly as it would against
/// real hardware.
pub fn run_simulation(duration: Duration, gi_delay_us: u64) -> Result<()> {
    let (sampler, port) = QueueSampler::new();
    let mut monitor = PowerMonitor::with_defaults(sampler)?;
    monitor.start()?;

    let started = Instant::now();
    let mut half_cycles: u64 = 0;
    let mut dropped: u64 = 0;
    fn push(ok: bool, dropped: &mut u64) {
        if !ok {
            *dropped += 1;
        }
    }

    while started.elapsed() < duration {
        let half_start = Instant::now();
        push(port.push_zero_cross(), &mut dropped);

        // Triacs fire gi_delay_us into the half-cycle.
        thread::sleep(Duration::from_micros(gi_delay_us.min(8000)));
        push(port.push_word(BusWord::encode(BusAddress::Triacs, 0x1F)), &mut dropped);

        // One column strobe per half-cycle, pattern rotating every 64.
        let col = (half_cycles % 8) as u8;
        let row = ((half_cycles / 64) as u8).rotate_left(col as u32);
        push(port.push_word(BusWord::encode(BusAddress::LampCol, 1 << col)), &mut dropped);
        push(port.push_word(BusWord::encode(BusAddress::LampRow, row)), &mut dropped);

        // A solenoid pulse every ~second, alternating banks.
        if half_cycles % 120 == 0 {
            let bank = match (half_cycles / 120) % 4 {
                0 => BusAddress::Sol1,
                1 => BusAddress::Sol2,
                2 => BusAddress::Sol3,
                _ => BusAddress::Sol4,
            };
            push(port.push_word(BusWord::encode(bank, 0x01)), &mut dropped);
        }

        half_cycles += 1;
        if let Some(rest) = HALF_CYCLE.checked_sub(half_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    monitor.stop()?;

    println!(
        "simulated {} half-cycles over {:.1} s ({} producer-side drops)",
        half_cycles,
        started.elapsed().as_secs_f64(),
        dropped
    );
    print_report(
        &monitor.get_stats(),
        monitor.get_lights(),
        monitor.get_solenoids(),
        monitor.get_gi(),
    );
    Ok(())
}
