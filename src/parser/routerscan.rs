// RouterScan export parser: one tab-separated report line per network.
// Field positions follow the scanner's "good results" export.

use once_cell::sync::Lazy;
use regex::Regex;

static LAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}\.\d+$").expect("valid lat regex"));
static LON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}\.\d+$").expect("valid lon regex"));
static MAC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-F]{2}:){5}[0-9A-F]{2}$").expect("valid mac regex"));

const MIN_FIELDS: usize = 9;
const ADMIN: usize = 4;
const BSSID: usize = 8;
const ESSID: usize = 9;
const KEY: usize = 11;
const PIN: usize = 12;
const LATITUDE: usize = 19;
const LONGITUDE: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub essid: String,
    pub bssid: Option<String>,
    pub wifi_key: Option<String>,
    pub wps_pin: Option<String>,
    pub admin: Option<String>,
    pub coordinates: Option<(f64, f64)>,
}

impl ScanRecord {
    // Content digest used for exact-duplicate removal.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for part in [
            Some(self.essid.as_str()),
            self.bssid.as_deref(),
            self.wifi_key.as_deref(),
            self.wps_pin.as_deref(),
            self.admin.as_deref(),
        ] {
            hasher.update(part.unwrap_or("\u{0}").as_bytes());
            hasher.update(b"\t");
        }
        if let Some((lat, lon)) = self.coordinates {
            hasher.update(&lat.to_le_bytes());
            hasher.update(&lon.to_le_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScanStats {
    pub lines: u64,
    pub records: u64,
    pub with_coordinates: u64,
    pub with_key: u64,
    pub with_pin: u64,
    pub with_admin: u64,
}

impl ScanStats {
    fn count(&mut self, record: &ScanRecord) {
        self.records += 1;
        self.with_coordinates += record.coordinates.is_some() as u64;
        self.with_key += record.wifi_key.is_some() as u64;
        self.with_pin += record.wps_pin.is_some() as u64;
        self.with_admin += record.admin.is_some() as u64;
    }

    pub fn merge(&mut self, other: &ScanStats) {
        self.lines += other.lines;
        self.records += other.records;
        self.with_coordinates += other.with_coordinates;
        self.with_key += other.with_key;
        self.with_pin += other.with_pin;
        self.with_admin += other.with_admin;
    }
}

pub fn parse_text(text: &str) -> (Vec<ScanRecord>, ScanStats) {
    let mut stats = ScanStats::default();
    let mut records = Vec::new();
    for line in text.lines() {
        stats.lines += 1;
        if let Some(record) = parse_line(line) {
            stats.count(&record);
            records.push(record);
        }
    }
    (records, stats)
}

pub fn parse_line(line: &str) -> Option<ScanRecord> {
    if line.trim().is_empty() || line.starts_with('#') {
        return None;
    }
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < MIN_FIELDS {
        return None;
    }
    let field = |i: usize| parts.get(i).map_or("", |s| s.trim());

    let essid = field(ESSID).to_string();
    let bssid = normalize_mac(field(BSSID));
    if essid.is_empty() && bssid.is_none() {
        return None;
    }

    Some(ScanRecord {
        essid,
        bssid,
        wifi_key: meaningful(field(KEY)).map(str::to_string),
        wps_pin: meaningful(field(PIN))
            .filter(|pin| pin.len() >= 4 && pin.bytes().all(|b| b.is_ascii_digit()))
            .map(str::to_string),
        admin: admin_credentials(field(ADMIN)),
        coordinates: coordinates(&parts),
    })
}

// Canonical "AA:BB:CC:DD:EE:FF", or None when the field is not a MAC.
pub fn normalize_mac(raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "0.0.0.0" {
        return None;
    }
    let upper = raw.trim().to_uppercase().replace('-', ":");
    if MAC_RE.is_match(&upper) {
        return Some(upper);
    }
    let hex: String = upper.chars().filter(|c| *c != ':').collect();
    if hex.len() == 12 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        let pairs: Vec<&str> = (0..12).step_by(2).map(|i| &hex[i..i + 2]).collect();
        Some(pairs.join(":"))
    } else {
        None
    }
}

fn meaningful(value: &str) -> Option<&str> {
    match value {
        "" | "0" | "-" | "NULL" => None,
        v => Some(v),
    }
}

fn admin_credentials(value: &str) -> Option<String> {
    match value {
        "" | ":" | "-" | "NULL" => None,
        v if v.contains(':') && !v.contains("0.0.0.0") => Some(v.to_string()),
        _ => None,
    }
}

fn in_range(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) && lat != 0.0 && lon != 0.0
}

// Fixed columns first; older exports shift the pair, so fall back to
// looking for it near the end of the line.
fn coordinates(parts: &[&str]) -> Option<(f64, f64)> {
    if parts.len() > LONGITUDE {
        let lat = parts[LATITUDE].trim().parse::<f64>();
        let lon = parts[LONGITUDE].trim().parse::<f64>();
        if let (Ok(lat), Ok(lon)) = (lat, lon) {
            if in_range(lat, lon) {
                return Some((lat, lon));
            }
        }
    }
    if parts.len() < 14 {
        return None;
    }
    let start = parts.len().saturating_sub(5);
    (start..parts.len() - 1).find_map(|i| {
        let (lat, lon) = (parts[i].trim(), parts[i + 1].trim());
        if !LAT_RE.is_match(lat) || !LON_RE.is_match(lon) {
            return None;
        }
        let (lat, lon) = (lat.parse::<f64>().ok()?, lon.parse::<f64>().ok()?);
        in_range(lat, lon).then_some((lat, lon))
    })
}
