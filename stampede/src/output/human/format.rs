use std::time::Duration;

pub(crate) fn format_duration(d: Duration) -> String {
    // Single rounded component in one of: us, ms, s.
    let total_ns: u128 = d.as_nanos();

    const NS_PER_US: u128 = 1_000;
    const NS_PER_MS: u128 = 1_000_000;
    const NS_PER_S: u128 = 1_000_000_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        // Round to nearest integer (ties round up).
        (value + (unit / 2)) / unit
    }

    if total_ns == 0 {
        return "0s".to_string();
    }
    if total_ns >= NS_PER_S {
        return format!("{}s", round_div(total_ns, NS_PER_S));
    }
    if total_ns >= NS_PER_MS {
        return format!("{}ms", round_div(total_ns, NS_PER_MS));
    }
    format!("{}us", round_div(total_ns, NS_PER_US))
}

/// Trend values are milliseconds.
pub(crate) fn format_ms_opt(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.2}ms"),
        _ => "-".to_string(),
    }
}

pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

pub(crate) fn format_tags_inline(tags: &[(String, String)]) -> String {
    if tags.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<&(String, String)> = tags.iter().collect();
    sorted.sort();

    let inner = sorted
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");

    format!(" {{{inner}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_as_one_rounded_unit() {
        assert_eq!(format_duration(Duration::from_micros(1499)), "1ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "2s");
        assert_eq!(format_duration(Duration::from_nanos(400)), "0us");
        assert_eq!(format_duration(Duration::from_secs(120)), "120s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn numbers_drop_trailing_zero_fractions() {
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(-95.0), "-95");
        assert_eq!(format_number(12.345), "12.35");
        assert_eq!(format_ms_opt(None), "-");
        assert_eq!(format_ms_opt(Some(50.0)), "50.00ms");
    }

    #[test]
    fn tags_are_sorted() {
        let tags = vec![
            ("testId".to_string(), "x".to_string()),
            ("Api".to_string(), "/v6/".to_string()),
        ];
        assert_eq!(format_tags_inline(&tags), " {Api=/v6/ testId=x}");
        assert_eq!(format_tags_inline(&[]), "");
    }
}
