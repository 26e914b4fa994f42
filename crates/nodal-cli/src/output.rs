//! Textual result dump, sorted by variable name.

use nodal_core::units::format_value;
use nodal_solver::ResultSet;

/// Print one analysis's results. Scalar series print on one line; longer
/// series print first/last values with the point count.
pub fn print_results(label: &str, results: &ResultSet) {
    println!("=== {label} ===");
    for name in results.sorted_names() {
        let series = results.get(name).unwrap_or(&[]);
        match series.len() {
            0 => {}
            1 => println!("{name:<16} {}", format_value(series[0])),
            n => println!(
                "{name:<16} {} .. {}  ({n} points)",
                format_value(series[0]),
                format_value(series[n - 1]),
            ),
        }
    }
    println!();
}
