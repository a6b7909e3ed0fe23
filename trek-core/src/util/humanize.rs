//! src/util/humanize.rs

const SUFFIXES: [&str; 8] = ["K", "M", "G", "T", "P", "E", "Z", "Y"];

/// Metric (1000-based) size rendering used in progress and status text.
///
/// Below ten units one decimal is kept and rounded down, so `1999` reads as
/// `1.9K` rather than `2.0K`. Larger values drop the fraction the same way.
/// This is lf's size rule, so sizes read the same as in lf's own status line;
/// `bytesize` rounds to nearest and uses different unit labels.
pub fn human_readable_size(size: u64) -> String {
    if size < 1000 {
        return format!("{size}B");
    }

    let mut curr: f64 = size as f64 / 1000.0;
    for suffix in SUFFIXES {
        if curr < 10.0 {
            let tenths: f64 = (curr * 10.0).floor() / 10.0;
            return format!("{tenths:.1}{suffix}");
        }
        if curr < 1000.0 {
            return format!("{}{suffix}", curr.floor() as u64);
        }
        curr /= 1000.0;
    }

    format!("{size}B")
}
