use regex::Regex;
use std::sync::LazyLock;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*([dhms])").expect("duration regex"));

/// Extract a numeric representation of a string metric value.
///
/// Status words map to 1 / 0.5 / 0, `N%` to N, plain numbers to themselves,
/// and `2d 3h 0m 4s`-style durations to total seconds. Returns `None` when
/// the value has no meaningful numeric form.
pub fn parse_value_num(value: &str) -> Option<f64> {
    let v = value.trim().to_lowercase();

    match v.as_str() {
        "up" | "ok" | "running" | "active" | "online" | "reachable" | "open" => {
            return Some(1.0)
        }
        "down" | "critical" | "error" | "offline" | "inactive" | "unreachable" | "closed" => {
            return Some(0.0)
        }
        "warning" | "degraded" | "paused" => return Some(0.5),
        _ => {}
    }

    if let Some(pct) = v.strip_suffix('%') {
        if let Ok(n) = pct.parse::<f64>() {
            return Some(n);
        }
    }

    if let Ok(n) = v.parse::<f64>() {
        return Some(n);
    }

    parse_duration_secs(&v).map(|secs| secs as f64)
}

/// Sum all `<number><unit>` fragments (d/h/m/s) in `s` into seconds.
/// Returns `None` when no fragment matches.
pub fn parse_duration_secs(s: &str) -> Option<i64> {
    let mut total: i64 = 0;
    let mut matched = false;
    for cap in DURATION_RE.captures_iter(s) {
        matched = true;
        let n: i64 = cap[1].parse().ok()?;
        total += match &cap[2] {
            "d" => n * 86_400,
            "h" => n * 3_600,
            "m" => n * 60,
            _ => n,
        };
    }
    matched.then_some(total)
}
