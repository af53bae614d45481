// Fixed target layouts: the geo table plus one credentials table per dump family.
// Column order here is the positional order of the dump tuples.

use crate::config::IndexTier;
use crate::value::ScalarValue;

#[derive(Debug, Clone, Copy)]
pub enum Fill {
    Int(i64),
    Text(&'static str),
}

impl Fill {
    pub fn value(self) -> ScalarValue {
        match self {
            Fill::Int(v) => ScalarValue::Integer(v),
            Fill::Text(s) => ScalarValue::Text(s.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub decl: &'static str,
    // Value used by recovery when a NOT NULL column arrives empty.
    pub fill: Option<Fill>,
}

const fn col(name: &'static str, decl: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        decl,
        fill: None,
    }
}

const fn required(name: &'static str, decl: &'static str, fill: Fill) -> ColumnSpec {
    ColumnSpec {
        name,
        decl,
        fill: Some(fill),
    }
}

#[derive(Debug)]
pub struct IndexSpec {
    pub name: &'static str,
    pub target: &'static str,
    pub tier: IndexTier,
}

const fn index(name: &'static str, target: &'static str, tier: IndexTier) -> IndexSpec {
    IndexSpec { name, target, tier }
}

#[derive(Debug, Clone, Copy)]
pub struct GeoColumns {
    pub latitude: usize,
    pub longitude: usize,
    pub quadkey: usize,
}

// Columns worth keeping when a record is too broken to parse.
#[derive(Debug, Clone, Copy)]
pub struct SalvageColumns {
    pub key: Option<usize>,
    pub identifier: usize,
}

#[derive(Debug)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    // Leading column is assigned by the store.
    pub identity: bool,
    pub geo: Option<GeoColumns>,
    pub salvage: SalvageColumns,
    pub indexes: &'static [IndexSpec],
}

impl TableSpec {
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn create_sql(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.decl))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.name,
            cols.join(",\n")
        )
    }

    // Uniqueness conflicts are skipped; every other constraint still errors.
    pub fn insert_sql(&self) -> String {
        let placeholders = vec!["?"; self.arity()].join(", ");
        format!(
            "INSERT INTO {} VALUES ({}) ON CONFLICT DO NOTHING",
            self.name, placeholders
        )
    }

    pub fn index_sql(&self, tier: IndexTier) -> Vec<String> {
        self.indexes
            .iter()
            .filter(|ix| tier.includes(ix.tier))
            .map(|ix| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    ix.name, self.name, ix.target
                )
            })
            .collect()
    }
}

pub static GEO: TableSpec = TableSpec {
    name: "geo",
    columns: &[
        col("BSSID", "INTEGER"),
        col("latitude", "FLOAT"),
        col("longitude", "FLOAT"),
        col("quadkey", "INTEGER"),
    ],
    identity: false,
    geo: Some(GeoColumns {
        latitude: 1,
        longitude: 2,
        quadkey: 3,
    }),
    salvage: SalvageColumns {
        key: None,
        identifier: 0,
    },
    indexes: &[
        index("idx_geo_BSSID", "BSSID", IndexTier::Basic),
        index("idx_geo_latitude", "latitude", IndexTier::Basic),
        index("idx_geo_longitude", "longitude", IndexTier::Basic),
        index(
            "idx_geo_quadkey_full",
            "quadkey, latitude, longitude, BSSID",
            IndexTier::Full,
        ),
    ],
};

// 3wifi credentials table.
pub static BASE: TableSpec = TableSpec {
    name: "base",
    columns: &[
        col("id", "INTEGER PRIMARY KEY"),
        col("time", "TIMESTAMP"),
        col("cmtid", "INTEGER"),
        col("IP", "INTEGER"),
        col("Port", "INTEGER"),
        col("Authorization", "TEXT"),
        col("name", "TEXT"),
        required("RadioOff", "INTEGER NOT NULL DEFAULT 0", Fill::Int(0)),
        required("Hidden", "INTEGER NOT NULL DEFAULT 0", Fill::Int(0)),
        required("NoBSSID", "INTEGER NOT NULL", Fill::Int(0)),
        required("BSSID", "INTEGER NOT NULL", Fill::Int(0)),
        col("ESSID", "TEXT"),
        col("Security", "INTEGER"),
        required("WiFiKey", "TEXT NOT NULL DEFAULT ''", Fill::Text("")),
        required("WPSPIN", "INTEGER NOT NULL", Fill::Int(0)),
        col("LANIP", "INTEGER"),
        col("LANMask", "INTEGER"),
        col("WANIP", "INTEGER"),
        col("WANMask", "INTEGER"),
        col("WANGateway", "INTEGER"),
        col("DNS1", "INTEGER"),
        col("DNS2", "INTEGER"),
        col("DNS3", "INTEGER"),
    ],
    identity: true,
    geo: None,
    salvage: SalvageColumns {
        key: Some(13),
        identifier: 10,
    },
    indexes: &[
        index("idx_base_BSSID", "BSSID", IndexTier::Basic),
        index("idx_base_ESSID", "ESSID COLLATE NOCASE", IndexTier::Basic),
        index("idx_base_wpspin", "WPSPIN", IndexTier::Full),
        index("idx_base_wifikey", "WiFiKey COLLATE NOCASE", IndexTier::Full),
    ],
};

// p3wifi credentials table, also the target of RouterScan imports.
pub static NETS: TableSpec = TableSpec {
    name: "nets",
    columns: &[
        col("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
        col("time", "TIMESTAMP"),
        col("cmtid", "INTEGER"),
        col("IP", "INTEGER"),
        col("Port", "INTEGER"),
        col("Authorization", "TEXT"),
        col("name", "TEXT"),
        required("RadioOff", "INTEGER NOT NULL DEFAULT 0", Fill::Int(0)),
        required("Hidden", "INTEGER NOT NULL DEFAULT 0", Fill::Int(0)),
        required("NoBSSID", "INTEGER NOT NULL", Fill::Int(0)),
        required("BSSID", "INTEGER NOT NULL", Fill::Int(0)),
        col("ESSID", "TEXT"),
        col("Security", "INTEGER"),
        required("NoWiFiKey", "INTEGER NOT NULL DEFAULT 0", Fill::Int(0)),
        required("WiFiKey", "TEXT NOT NULL", Fill::Text("")),
        required("NoWPS", "INTEGER NOT NULL DEFAULT 0", Fill::Int(0)),
        required("WPSPIN", "INTEGER NOT NULL", Fill::Int(0)),
        col("LANIP", "INTEGER"),
        col("LANMask", "INTEGER"),
        col("WANIP", "INTEGER"),
        col("WANMask", "INTEGER"),
        col("WANGateway", "INTEGER"),
        col("DNS1", "INTEGER"),
        col("DNS2", "INTEGER"),
        col("DNS3", "INTEGER"),
    ],
    identity: true,
    geo: None,
    salvage: SalvageColumns {
        key: Some(14),
        identifier: 10,
    },
    indexes: &[
        index("idx_nets_BSSID", "BSSID", IndexTier::Basic),
        index("idx_nets_ESSID", "ESSID COLLATE NOCASE", IndexTier::Basic),
        index("idx_nets_WPSPIN", "WPSPIN", IndexTier::Full),
        index("idx_nets_WiFiKey", "WiFiKey COLLATE NOCASE", IndexTier::Full),
        index(
            "idx_nets_composite",
            "BSSID, ESSID, WiFiKey, WPSPIN",
            IndexTier::Full,
        ),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
pub enum Layout {
    #[value(name = "3wifi")]
    #[serde(rename = "3wifi")]
    ThreeWifi,
    #[value(name = "p3wifi")]
    #[serde(rename = "p3wifi")]
    P3Wifi,
}

impl Layout {
    pub fn tables(self) -> &'static [&'static TableSpec] {
        static THREE_WIFI: [&TableSpec; 2] = [&GEO, &BASE];
        static P3WIFI: [&TableSpec; 2] = [&GEO, &NETS];
        match self {
            Layout::ThreeWifi => &THREE_WIFI,
            Layout::P3Wifi => &P3WIFI,
        }
    }
}
