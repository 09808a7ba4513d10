//! Number formatting for CSV cells
//!
//! Uses `ryu` for shortest round-trip float formatting on a stack buffer.
//! Integral values drop the trailing `.0` so a sample of `120` renders as
//! `120`, matching what downstream spreadsheet tooling expects.

/// Format an `f64` for a CSV cell
///
/// ```rust
/// use common::numfmt::format_f64;
///
/// assert_eq!(format_f64(1.0), "1");
/// assert_eq!(format_f64(-0.25), "-0.25");
/// assert_eq!(format_f64(f64::NAN), "NaN");
/// ```
pub fn format_f64(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let mut buffer = ryu::Buffer::new();
    let s = buffer.format_finite(n);
    match s.strip_suffix(".0") {
        Some(integral) if integral == "-0" => "0".to_string(),
        Some(integral) => integral.to_string(),
        None => s.to_string(),
    }
}
