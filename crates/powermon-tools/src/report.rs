//! Text report for decoded state and statistics.

use comfy_table::Table;
use powermon::{Stats, TRIAC_CHANNELS};

/// Render the lamp matrix bitmap as an 8x8 grid, one line per row.
fn lamp_grid(lights: u64) -> Vec<String> {
    let columns = lights.to_be_bytes();
    (0..8)
        .map(|row| {
            let cells: Vec<&str> = columns
                .iter()
                .map(|col| if col >> row & 1 != 0 { "X" } else { "." })
                .collect();
            cells.join(" ")
        })
        .collect()
}

/// Print decoded state and the statistics table.
pub fn print_report(stats: &Stats, lights: u64, solenoids: u32, gi: [u8; TRIAC_CHANNELS]) {
    println!();
    println!("Lamp matrix (columns 0-7 left to right):");
    for line in lamp_grid(lights) {
        println!("  {line}");
    }
    println!();
    println!("Solenoids: {:032b}", solenoids);
    let levels: Vec<String> = gi.iter().map(|level| level.to_string()).collect();
    println!("GI levels: [{}]", levels.join(", "));
    println!();

    let mut table = Table::new();
    table.set_header(vec!["statistic", "value"]);
    table.add_row(vec!["event_count".to_string(), stats.event_count.to_string()]);
    table.add_row(vec![
        "max_queue_depth".to_string(),
        stats.max_queue_depth.to_string(),
    ]);
    table.add_row(vec!["overflow".to_string(), stats.overflow.to_string()]);
    table.add_row(vec![
        "address_errors".to_string(),
        stats.address_errors.to_string(),
    ]);
    table.add_row(vec![
        "rows_detected".to_string(),
        stats.rows_detected.to_string(),
    ]);
    table.add_row(vec![
        "cols_detected".to_string(),
        stats.cols_detected.to_string(),
    ]);
    table.add_row(vec![
        "zero_crossings_detected".to_string(),
        stats.zero_crossings_detected.to_string(),
    ]);
    table.add_row(vec![
        "triac_events_detected".to_string(),
        stats.triac_events_detected.to_string(),
    ]);
    table.add_row(vec![
        "triac_min_time_us".to_string(),
        stats.triac_min_time_us.to_string(),
    ]);
    table.add_row(vec![
        "triac_max_time_us".to_string(),
        stats.triac_max_time_us.to_string(),
    ]);
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamp_grid_marks_set_bits() {
        // Column 0 byte 0x01: row 0 of column 0 lit.
        let grid = lamp_grid(0x0100_0000_0000_0000);
        assert_eq!(grid[0], "X . . . . . . .");
        assert_eq!(grid[1], ". . . . . . . .");
    }
}
