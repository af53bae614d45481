// Derived identifiers: Web-Mercator tile keys, MAC integers and the
// ESSID-hash stand-in for networks without a BSSID.

const TILE_LEVEL: u32 = 18;

// Interleaved tile index at level 18; x bits land on even positions.
pub fn quadkey(latitude: f64, longitude: f64) -> i64 {
    if latitude == 0.0 || longitude == 0.0 || !latitude.is_finite() || !longitude.is_finite() {
        return 0;
    }
    let n = (1u64 << TILE_LEVEL) as f64;
    let max = (1i64 << TILE_LEVEL) - 1;
    let lat_rad = latitude.to_radians();
    let x = ((longitude + 180.0) / 360.0 * n).floor() as i64;
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0 * n)
        .floor() as i64;
    let (x, y) = (x.clamp(0, max), y.clamp(0, max));

    let mut key = 0i64;
    for level in (0..TILE_LEVEL).rev() {
        key = (key << 2) | (((y >> level) & 1) << 1) | ((x >> level) & 1);
    }
    key
}

// "AA:BB:CC:DD:EE:FF" -> 48-bit integer; 0 when not a MAC.
pub fn mac_to_integer(mac: &str) -> i64 {
    let hex: String = mac.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 12 {
        return 0;
    }
    i64::from_str_radix(&hex, 16).unwrap_or(0)
}

// Stable non-zero 48-bit identifier for a network known only by name.
pub fn essid_identifier(essid: &str) -> i64 {
    let digest = blake3::hash(essid.as_bytes());
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(&digest.as_bytes()[..6]);
    let id = i64::from_be_bytes(buf);
    if id == 0 {
        1
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_coordinate_has_no_tile() {
        assert_eq!(quadkey(0.0, 37.6), 0);
        assert_eq!(quadkey(55.7, 0.0), 0);
    }

    #[test]
    fn top_level_quadrant_matches_hemisphere() {
        let top = |k: i64| k >> (2 * (TILE_LEVEL - 1));
        // North-east: x in upper half, y in upper (northern) half.
        assert_eq!(top(quadkey(10.0, 10.0)), 1);
        // South-west: x lower half, y lower (southern) half.
        assert_eq!(top(quadkey(-10.0, -10.0)), 2);
        assert_eq!(top(quadkey(-10.0, 10.0)), 3);
        assert_eq!(top(quadkey(10.0, -10.0)), 0);
    }

    #[test]
    fn tile_key_fits_level() {
        let k = quadkey(55.7558, 37.6173);
        assert!(k > 0 && k < 1i64 << (2 * TILE_LEVEL));
        assert_eq!(quadkey(55.7558, 37.6173), k);
        assert!(quadkey(89.99, 179.99) < 1i64 << (2 * TILE_LEVEL));
    }

    #[test]
    fn mac_conversion() {
        assert_eq!(mac_to_integer("AA:BB:CC:DD:EE:FF"), 0xAABB_CCDD_EEFF);
        assert_eq!(mac_to_integer("00:00:00:00:00:01"), 1);
        assert_eq!(mac_to_integer("not a mac"), 0);
    }

    #[test]
    fn essid_identifier_is_stable_and_48_bit() {
        let a = essid_identifier("HomeNet");
        assert_eq!(a, essid_identifier("HomeNet"));
        assert_ne!(a, essid_identifier("OtherNet"));
        assert!(a > 0 && a < 1i64 << 48);
    }
}
