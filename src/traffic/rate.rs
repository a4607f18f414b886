//! Data rate parsing utilities.
//!
//! Rates are written the way the simulator writes them (`100kb/s`, `1Mbps`,
//! `12kB/s`). Lower-case `b` counts bits, upper-case `B` counts bytes.

/// Parse a data rate string (e.g. "100kb/s", "1Mbps", "500") to bits per second
///
/// Supports:
/// - Raw bits per second: "500"
/// - Bit units: "500bps", "500b/s"
/// - Byte units: "64Bps", "64B/s"
/// - Prefixes `k`/`K`, `M`, `G`/`g` in front of either unit
///
/// # Examples
/// ```
/// use hiernet::traffic::rate::parse_data_rate;
///
/// assert_eq!(parse_data_rate("100kb/s"), Ok(100_000));
/// assert_eq!(parse_data_rate("1Mbps"), Ok(1_000_000));
/// assert_eq!(parse_data_rate("2kB/s"), Ok(16_000));
/// assert!(parse_data_rate("fast").is_err());
/// ```
pub fn parse_data_rate(rate: &str) -> Result<u64, String> {
    let rate = rate.trim();
    let split = rate
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rate.len());
    let (number, unit) = rate.split_at(split);

    let value = number
        .parse::<f64>()
        .map_err(|_| format!("Invalid data rate format: {}", rate))?;
    if !value.is_finite() {
        return Err(format!("Invalid data rate format: {}", rate));
    }

    let unit = unit.trim();
    let (multiplier, unit) = match unit.chars().next() {
        Some('k') | Some('K') => (1e3, &unit[1..]),
        Some('M') => (1e6, &unit[1..]),
        Some('G') | Some('g') => (1e9, &unit[1..]),
        _ => (1.0, unit),
    };
    let bits_per_unit = match unit {
        "" | "bps" | "b/s" => 1.0,
        "Bps" | "B/s" => 8.0,
        _ => return Err(format!("Unknown data rate unit in: {}", rate)),
    };

    Ok((value * multiplier * bits_per_unit).round() as u64)
}

/// Format bits per second with the largest fitting prefix
pub fn format_data_rate(bits_per_second: u64) -> String {
    if bits_per_second >= 1_000_000_000 && bits_per_second % 1_000_000_000 == 0 {
        format!("{}Gb/s", bits_per_second / 1_000_000_000)
    } else if bits_per_second >= 1_000_000 && bits_per_second % 1_000_000 == 0 {
        format!("{}Mb/s", bits_per_second / 1_000_000)
    } else if bits_per_second >= 1_000 && bits_per_second % 1_000 == 0 {
        format!("{}kb/s", bits_per_second / 1_000)
    } else {
        format!("{}b/s", bits_per_second)
    }
}
