use csnmp::ObjectValue;

/// A decoded SNMP value after applying a column/OID format.
#[derive(Debug, Clone, PartialEq)]
pub enum Formatted {
    Text(String),
    Int(i64),
    Uint(u64),
}

impl Formatted {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Formatted::Int(n) => Some(*n),
            Formatted::Uint(n) => i64::try_from(*n).ok(),
            Formatted::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Formatted::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Formatted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Formatted::Text(s) => write!(f, "{s}"),
            Formatted::Int(n) => write!(f, "{n}"),
            Formatted::Uint(n) => write!(f, "{n}"),
        }
    }
}

/// Apply a declared format to a PDU value.
///
/// | format     | result                                                |
/// |------------|-------------------------------------------------------|
/// | string     | octet string → UTF-8, else stringified                |
/// | timeticks  | uint32 hundredths of seconds → "Nd Nh Nm Ns"          |
/// | integer    | numeric types coerced; decimal byte strings parsed    |
/// | counter    | unsigned width preserved                              |
/// | gauge      | unsigned width preserved                              |
/// | physaddr   | 6 bytes → "xx:xx:xx:xx:xx:xx", else ""                |
/// | ifstatus   | RFC 2863 admin/oper status words                      |
pub fn format_value(value: &ObjectValue, format: &str) -> Formatted {
    match format {
        "string" => Formatted::Text(stringify(value)),

        "timeticks" => match value {
            ObjectValue::TimeTicks(ticks) => Formatted::Text(format_timeticks(*ticks)),
            other => Formatted::Text(stringify(other)),
        },

        "integer" => match value {
            ObjectValue::Integer(n) => Formatted::Int(*n as i64),
            ObjectValue::Counter32(n) | ObjectValue::Unsigned32(n) | ObjectValue::TimeTicks(n) => {
                Formatted::Int(*n as i64)
            }
            ObjectValue::Counter64(n) => Formatted::Int(*n as i64),
            ObjectValue::String(bytes) => {
                match std::str::from_utf8(bytes).ok().and_then(|s| s.trim().parse().ok()) {
                    Some(n) => Formatted::Int(n),
                    None => Formatted::Text(stringify(value)),
                }
            }
            other => Formatted::Text(stringify(other)),
        },

        "counter" | "gauge" => match value {
            ObjectValue::Counter32(n) | ObjectValue::Unsigned32(n) => Formatted::Uint(*n as u64),
            ObjectValue::Counter64(n) => Formatted::Uint(*n),
            ObjectValue::Integer(n) => Formatted::Int(*n as i64),
            other => Formatted::Text(stringify(other)),
        },

        "physaddr" => match value {
            ObjectValue::String(bytes) if bytes.len() == 6 => {
                Formatted::Text(format_mac(bytes))
            }
            _ => Formatted::Text(String::new()),
        },

        "ifstatus" => {
            let n = match value {
                ObjectValue::Integer(n) => *n as i64,
                ObjectValue::Counter32(n) | ObjectValue::Unsigned32(n) => *n as i64,
                _ => 0,
            };
            Formatted::Text(ifstatus_word(n))
        }

        _ => Formatted::Text(stringify(value)),
    }
}

fn stringify(value: &ObjectValue) -> String {
    match value {
        ObjectValue::Integer(n) => n.to_string(),
        ObjectValue::String(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ObjectValue::ObjectId(oid) => oid.to_string(),
        ObjectValue::IpAddress(addr) => addr.to_string(),
        ObjectValue::Counter32(n) => n.to_string(),
        ObjectValue::Unsigned32(n) => n.to_string(),
        ObjectValue::TimeTicks(n) => n.to_string(),
        ObjectValue::Opaque(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ObjectValue::Counter64(n) => n.to_string(),
    }
}

/// sysUpTime-style ticks (hundredths of a second) to "Nd Nh Nm Ns".
pub fn format_timeticks(ticks: u32) -> String {
    let total = u64::from(ticks) / 100;
    let days = total / 86_400;
    let hours = (total / 3_600) % 24;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;
    format!("{days}d {hours}h {minutes}m {seconds}s")
}

/// Lowercase colon-separated MAC.
pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse "xx:xx:xx:xx:xx:xx" back to bytes.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut out = [0u8; 6];
    let mut parts = s.split(':');
    for slot in &mut out {
        *slot = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(out)
}

/// RFC 2863 ifAdminStatus / ifOperStatus mapping.
fn ifstatus_word(n: i64) -> String {
    match n {
        1 => "up".to_string(),
        2 => "down".to_string(),
        3 => "testing".to_string(),
        4 => "unknown".to_string(),
        5 => "dormant".to_string(),
        6 => "notPresent".to_string(),
        7 => "lowerLayerDown".to_string(),
        other => other.to_string(),
    }
}
