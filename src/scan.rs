// RouterScan records -> nets/geo rows for the p3wifi layout.

use crate::error::Result;
use crate::geo;
use crate::normalize::{normalize, NormalizedRow};
use crate::parser::chunk::{ChunkDecoder, RawChunk};
use crate::parser::routerscan::{parse_text, ScanRecord, ScanStats};
use crate::schema::{GEO, NETS};
use crate::value::ScalarValue;
use std::path::Path;

#[derive(Debug)]
pub struct ScanRow {
    pub digest: [u8; 32],
    pub geo: Option<NormalizedRow>,
    pub nets: NormalizedRow,
}

#[derive(Debug, Default)]
pub struct ScanRows {
    pub rows: Vec<ScanRow>,
    pub stats: ScanStats,
    pub bytes: u64,
}

// Read and decode one export file in full.
pub fn read_scan_file(path: &Path, decoder: &ChunkDecoder) -> Result<(Vec<ScanRecord>, ScanStats)> {
    let bytes = std::fs::read(path)?;
    let chunk = RawChunk {
        index: 0,
        offset: 0,
        bytes: &bytes,
    };
    let text = decoder.decode(&chunk)?;
    Ok(parse_text(&text))
}

// Worker entry point: one file to ready-to-load rows.
pub fn scan_file(path: &Path, decoder: &ChunkDecoder, timestamp: &str) -> Result<ScanRows> {
    let bytes = std::fs::metadata(path)?.len();
    let (records, stats) = read_scan_file(path, decoder)?;
    let rows = records
        .iter()
        .map(|r| ScanRow {
            digest: r.digest(),
            geo: geo_row(r),
            nets: nets_row(r, timestamp),
        })
        .collect();
    Ok(ScanRows { rows, stats, bytes })
}

pub fn bssid_value(record: &ScanRecord) -> i64 {
    let mac = record.bssid.as_deref().map_or(0, geo::mac_to_integer);
    if mac != 0 {
        mac
    } else {
        geo::essid_identifier(&record.essid)
    }
}

pub fn geo_row(record: &ScanRecord) -> Option<NormalizedRow> {
    let (lat, lon) = record.coordinates?;
    let values = vec![
        ScalarValue::Integer(bssid_value(record)),
        ScalarValue::Float(lat),
        ScalarValue::Float(lon),
        ScalarValue::Integer(geo::quadkey(lat, lon)),
    ];
    Some(normalize(values, &GEO))
}

pub fn nets_row(record: &ScanRecord, timestamp: &str) -> NormalizedRow {
    let flag = |missing: bool| ScalarValue::Integer(missing as i64);
    let key = record.wifi_key.clone().unwrap_or_default();
    let pin = record
        .wps_pin
        .as_deref()
        .and_then(|p| p.parse::<i64>().ok())
        .unwrap_or(0);

    let mut values = vec![
        ScalarValue::Null,
        ScalarValue::Text(timestamp.to_string()),
        ScalarValue::Integer(0),
        ScalarValue::Integer(0),
        ScalarValue::Integer(0),
        record
            .admin
            .clone()
            .map_or(ScalarValue::Null, ScalarValue::Text),
        ScalarValue::Text(String::new()),
        ScalarValue::Integer(0),
        ScalarValue::Integer(0),
        flag(record.bssid.is_none()),
        ScalarValue::Integer(bssid_value(record)),
        ScalarValue::Text(record.essid.clone()),
        ScalarValue::Integer(if key.is_empty() { 0 } else { 2 }),
        flag(key.is_empty()),
        ScalarValue::Text(key),
        flag(record.wps_pin.is_none()),
        ScalarValue::Integer(pin),
    ];
    // LAN/WAN addressing and DNS are not part of the export.
    values.resize(NETS.arity(), ScalarValue::Integer(0));
    normalize(values, &NETS)
}

pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Fit;
    use std::io::Write;

    fn record() -> ScanRecord {
        ScanRecord {
            essid: "HomeNet".into(),
            bssid: Some("AA:BB:CC:DD:EE:FF".into()),
            wifi_key: Some("s3cret".into()),
            wps_pin: Some("12345670".into()),
            admin: None,
            coordinates: Some((55.75, 37.61)),
        }
    }

    #[test]
    fn nets_row_flags_and_security() {
        let row = nets_row(&record(), "2024-01-01 00:00:00");
        let v = row.values();
        assert_eq!(row.fit(), Fit::Exact);
        assert_eq!(v[9], ScalarValue::Integer(0));
        assert_eq!(v[10], ScalarValue::Integer(0xAABB_CCDD_EEFF));
        assert_eq!(v[12], ScalarValue::Integer(2));
        assert_eq!(v[13], ScalarValue::Integer(0));
        assert_eq!(v[14], ScalarValue::Text("s3cret".into()));
        assert_eq!(v[16], ScalarValue::Integer(12345670));
        assert_eq!(v[5], ScalarValue::Null);
    }

    #[test]
    fn missing_bssid_uses_essid_identifier() {
        let mut r = record();
        r.bssid = None;
        r.wifi_key = None;
        let row = nets_row(&r, "t");
        let v = row.values();
        assert_eq!(v[9], ScalarValue::Integer(1));
        assert_eq!(v[10], ScalarValue::Integer(geo::essid_identifier("HomeNet")));
        assert_eq!(v[12], ScalarValue::Integer(0));
        assert_eq!(v[13], ScalarValue::Integer(1));
    }

    #[test]
    fn geo_row_only_with_coordinates() {
        let row = geo_row(&record()).unwrap();
        assert_eq!(row.values()[3], ScalarValue::Integer(geo::quadkey(55.75, 37.61)));
        let mut r = record();
        r.coordinates = None;
        assert!(geo_row(&r).is_none());
    }

    #[test]
    fn reads_cp1251_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut fields = vec![b"".to_vec(); 13];
        fields[8] = b"AA:BB:CC:DD:EE:FF".to_vec();
        fields[9] = b"\xCF\xF0\xE8\xE2\xE5\xF2".to_vec();
        file.write_all(&fields.join(&b'\t')).unwrap();
        let scanned = scan_file(file.path(), &ChunkDecoder::default(), "t").unwrap();
        assert_eq!(scanned.rows.len(), 1);
        assert_eq!(scanned.stats.records, 1);
        assert!(scanned.rows[0].geo.is_none());
        assert_eq!(
            scanned.rows[0].nets.values()[11],
            ScalarValue::Text("Привет".into())
        );
    }
}
