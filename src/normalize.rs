// Row normalizer: reconciles a coerced tuple with the table arity and applies
// per-table fixups. NormalizedRow can only be built here, so every row that
// reaches the loader has exactly `arity` values.

use crate::geo;
use crate::schema::TableSpec;
use crate::value::{render_tuple, ScalarValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    Exact,
    Expanded,
    Truncated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    values: Vec<ScalarValue>,
    fit: Fit,
}

impl NormalizedRow {
    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn fit(&self) -> Fit {
        self.fit
    }

    // Length stays fixed; callers may only rewrite slots.
    pub(crate) fn values_mut(&mut self) -> &mut [ScalarValue] {
        &mut self.values
    }

    pub fn render(&self) -> String {
        render_tuple(&self.values)
    }
}

pub fn normalize(mut values: Vec<ScalarValue>, spec: &TableSpec) -> NormalizedRow {
    let arity = spec.arity();
    let fit = match values.len() {
        n if n == arity => Fit::Exact,
        n if n < arity => Fit::Expanded,
        _ => Fit::Truncated,
    };

    match fit {
        Fit::Truncated => values.truncate(arity),
        Fit::Expanded => {
            values.resize(arity, ScalarValue::Null);
            // Positions are unreliable once fields went missing; let the
            // store assign the key instead of trusting slot 0.
            if spec.identity {
                values[0] = ScalarValue::Null;
            }
        }
        Fit::Exact => {}
    }

    for v in values.iter_mut() {
        if let ScalarValue::Float(f) = v {
            if !f.is_finite() {
                *v = ScalarValue::Text(f.to_string());
            }
        }
    }

    fill_quadkey(&mut values, spec);
    NormalizedRow { values, fit }
}

// Map an explicit INSERT column list onto schema order. `positions[i]` is the
// schema slot of the i-th listed column; unlisted columns become Null.
pub fn project(values: Vec<ScalarValue>, positions: &[usize], arity: usize) -> Vec<ScalarValue> {
    let mut out = vec![ScalarValue::Null; arity];
    for (value, &slot) in values.into_iter().zip(positions) {
        if slot < arity {
            out[slot] = value;
        }
    }
    out
}

// Relaxed fixups used by recovery: store-assigned identity and NOT NULL fills.
pub(crate) fn apply_relaxed(row: &mut NormalizedRow, spec: &TableSpec) {
    let values = row.values_mut();
    if spec.identity {
        values[0] = ScalarValue::Null;
    }
    for (value, column) in values.iter_mut().zip(spec.columns) {
        if let (true, Some(fill)) = (value.is_null(), column.fill) {
            *value = fill.value();
        }
    }
}

fn fill_quadkey(values: &mut [ScalarValue], spec: &TableSpec) {
    let Some(cols) = spec.geo else {
        return;
    };
    let missing = matches!(
        values[cols.quadkey],
        ScalarValue::Null | ScalarValue::Integer(0)
    );
    if !missing {
        return;
    }
    if let (Some(lat), Some(lon)) = (
        as_coordinate(&values[cols.latitude]),
        as_coordinate(&values[cols.longitude]),
    ) {
        if lat != 0.0 && lon != 0.0 {
            values[cols.quadkey] = ScalarValue::Integer(geo::quadkey(lat, lon));
        }
    }
}

fn as_coordinate(v: &ScalarValue) -> Option<f64> {
    match v {
        ScalarValue::Float(f) => Some(*f),
        ScalarValue::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BASE, GEO};
    use crate::value::coerce;

    fn row(tokens: &[&str]) -> Vec<ScalarValue> {
        tokens.iter().map(|t| coerce(t)).collect()
    }

    fn base_tokens() -> Vec<String> {
        (1..=23).map(|i| i.to_string()).collect()
    }

    #[test]
    fn exact_row_is_unchanged() {
        let tokens = base_tokens();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let values = row(&refs);
        let out = normalize(values.clone(), &BASE);
        assert_eq!(out.fit(), Fit::Exact);
        assert_eq!(out.values(), values.as_slice());
        assert_eq!(normalize(out.values().to_vec(), &BASE), out);
    }

    #[test]
    fn short_row_is_padded_and_identity_cleared() {
        let out = normalize(row(&["7", "'2015-01-01'", "3"]), &BASE);
        assert_eq!(out.fit(), Fit::Expanded);
        assert_eq!(out.values().len(), 23);
        assert_eq!(out.values()[0], ScalarValue::Null);
        assert_eq!(out.values()[2], ScalarValue::Integer(3));
        assert!(out.values()[3..].iter().all(ScalarValue::is_null));
    }

    #[test]
    fn long_row_is_truncated() {
        let out = normalize(row(&["1", "2", "3", "4", "5", "6"]), &GEO);
        assert_eq!(out.fit(), Fit::Truncated);
        assert_eq!(out.values().len(), 4);
        assert_eq!(out.values()[3], ScalarValue::Integer(4));
    }

    #[test]
    fn geo_quadkey_is_filled_once() {
        let out = normalize(row(&["1", "55.75", "37.61", "NULL"]), &GEO);
        let ScalarValue::Integer(k) = out.values()[3] else {
            panic!("quadkey not filled: {:?}", out.values());
        };
        assert_eq!(k, geo::quadkey(55.75, 37.61));
        assert_eq!(normalize(out.values().to_vec(), &GEO), out);

        let nowhere = normalize(row(&["1", "0", "37.61", "NULL"]), &GEO);
        assert_eq!(nowhere.values()[3], ScalarValue::Null);

        let kept = normalize(row(&["1", "55.75", "37.61", "12345"]), &GEO);
        assert_eq!(kept.values()[3], ScalarValue::Integer(12345));
    }

    #[test]
    fn projection_places_named_columns() {
        let values = row(&["'key'", "42"]);
        let out = project(values, &[13, 10], 23);
        assert_eq!(out.len(), 23);
        assert_eq!(out[13], ScalarValue::Text("key".into()));
        assert_eq!(out[10], ScalarValue::Integer(42));
        assert!(out[0].is_null());
    }

    #[test]
    fn relaxed_fixups_fill_not_null_columns() {
        let mut out = normalize(row(&["5"]), &BASE);
        apply_relaxed(&mut out, &BASE);
        let v = out.values();
        assert_eq!(v[0], ScalarValue::Null);
        assert_eq!(v[10], ScalarValue::Integer(0));
        assert_eq!(v[13], ScalarValue::Text(String::new()));
        assert_eq!(v[11], ScalarValue::Null);
    }

    #[test]
    fn base_row_of_twenty_is_expanded() {
        let tokens: Vec<String> = base_tokens().into_iter().take(20).collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let values = row(&refs);
        let out = normalize(values.clone(), &BASE);
        assert_eq!(out.fit(), Fit::Expanded);
        assert_eq!(out.values().len(), 23);
        assert_eq!(out.values()[0], ScalarValue::Null);
        assert_eq!(&out.values()[1..20], &values[1..20]);
        assert!(out.values()[20..].iter().all(ScalarValue::is_null));
    }

    #[test]
    fn base_row_of_twenty_six_is_truncated() {
        let tokens: Vec<String> = (1..=26).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let values = row(&refs);
        let out = normalize(values.clone(), &BASE);
        assert_eq!(out.fit(), Fit::Truncated);
        assert_eq!(out.values(), &values[..23]);
        assert_eq!(out.values()[0], ScalarValue::Integer(1));
    }
}

