//! Post-query table transforms: geometry stripping, grouped sums and the
//! watershed-share column of the clean-energy report.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::table::{CellValue, ResultTable};

pub const SHAPE_COLUMN: &str = "SHAPE";

pub const FILE_GROUP_KEYS: [&str; 6] = [
    "FILE_NBR",
    "STAGE",
    "TENURE_TYPE",
    "TENURE_SUBTYPE",
    "TENURE_PURPOSE",
    "TENURE_SUBPURPOSE",
];

pub const PARCEL_AREA: &str = "PARCEL_AREA_HA";
pub const TENURE_AREA: &str = "TENURE_AREA_HA";
pub const INTERSECTION_AREA: &str = "INTERSECTION_AREA_HA";
pub const INTERSECTION_PCT: &str = "INTERSECTION_PCT_OF_WSHD";

const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

/// Grouping key ordered with [`CellValue::total_cmp`].
#[derive(Debug, Clone)]
struct GroupKey(Vec<CellValue>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| a.total_cmp(b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Removes the WKT geometry column, leaving attributes only.
pub fn drop_geometry(table: ResultTable) -> Result<ResultTable> {
    table.drop_column(SHAPE_COLUMN)
}

/// Groups rows by `keys` and sums each of `sums` within a group.
///
/// Output rows are sorted by key ascending. Rows with a null in any key are
/// left out; null measures count as zero.
pub fn group_sum(table: &ResultTable, keys: &[&str], sums: &[&str]) -> Result<ResultTable> {
    let key_indices = keys
        .iter()
        .map(|key| table.require_column(key))
        .collect::<Result<Vec<_>>>()?;
    let sum_indices = sums
        .iter()
        .map(|sum| table.require_column(sum))
        .collect::<Result<Vec<_>>>()?;

    let mut groups: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for row in table.rows() {
        let key: Vec<CellValue> = key_indices.iter().map(|&index| row[index].clone()).collect();
        if key.iter().any(CellValue::is_null) {
            continue;
        }
        let totals = groups
            .entry(GroupKey(key))
            .or_insert_with(|| vec![0.0; sum_indices.len()]);
        for (total, &index) in totals.iter_mut().zip(&sum_indices) {
            *total += row[index].as_f64().unwrap_or(0.0);
        }
    }

    let columns = keys.iter().chain(sums).map(|name| name.to_string());
    let rows = groups
        .into_iter()
        .map(|(GroupKey(mut key), totals)| {
            key.extend(totals.into_iter().map(CellValue::Float));
            key
        })
        .collect();
    ResultTable::new(columns).with_rows(rows)
}

/// Rounds to `places` decimals, ties to even.
pub fn round_half_even(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round_ties_even() / scale
}

/// Aggregates the clean-energy full list by tenure file and adds each
/// file's share of the watershed.
pub fn aggregate_unique_files(full_list: &ResultTable, watershed_area_m2: f64) -> Result<ResultTable> {
    let mut grouped = group_sum(full_list, &FILE_GROUP_KEYS, &[PARCEL_AREA, INTERSECTION_AREA])?;
    grouped.rename_column(PARCEL_AREA, TENURE_AREA)?;

    let intersection = grouped.require_column(INTERSECTION_AREA)?;
    let watershed_area_ha = watershed_area_m2 / SQUARE_METRES_PER_HECTARE;
    grouped.push_column(INTERSECTION_PCT, |row| {
        match row[intersection].as_f64() {
            Some(area) if watershed_area_ha > 0.0 => {
                CellValue::Float(round_half_even(area / watershed_area_ha * 100.0, 4))
            }
            _ => CellValue::Null,
        }
    });
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tenure_row(file: &str, stage: &str, parcel: f64, intersection: f64) -> Vec<CellValue> {
        vec![
            file.into(),
            stage.into(),
            "LICENCE".into(),
            "INVESTIGATIVE PERMIT".into(),
            "POWER".into(),
            "WIND POWER".into(),
            CellValue::Float(parcel),
            CellValue::Float(intersection),
        ]
    }

    fn full_list() -> ResultTable {
        let columns = FILE_GROUP_KEYS
            .iter()
            .copied()
            .chain([PARCEL_AREA, INTERSECTION_AREA]);
        ResultTable::new(columns)
            .with_rows(vec![
                tenure_row("3412345", "TENURE", 10.0, 2.5),
                tenure_row("3400001", "APPLICATION", 4.0, 4.0),
                tenure_row("3412345", "TENURE", 6.0, 1.5),
            ])
            .unwrap()
    }

    #[test]
    fn groups_are_sorted_and_summed() {
        let grouped = aggregate_unique_files(&full_list(), 1_000_000.0).unwrap();
        assert_eq!(
            grouped.columns(),
            [
                "FILE_NBR",
                "STAGE",
                "TENURE_TYPE",
                "TENURE_SUBTYPE",
                "TENURE_PURPOSE",
                "TENURE_SUBPURPOSE",
                "TENURE_AREA_HA",
                "INTERSECTION_AREA_HA",
                "INTERSECTION_PCT_OF_WSHD",
            ]
        );
        assert_eq!(grouped.row_count(), 2);
        assert_eq!(grouped.rows()[0][0], CellValue::from("3400001"));
        assert_eq!(grouped.rows()[1][6], CellValue::Float(16.0));
        assert_eq!(grouped.rows()[1][7], CellValue::Float(4.0));
        // 4 ha of a 100 ha watershed
        assert_eq!(grouped.rows()[1][8], CellValue::Float(4.0));
    }

    #[test]
    fn null_keys_are_dropped_and_null_measures_count_as_zero() {
        let mut table = full_list();
        let mut orphan = tenure_row("3499999", "TENURE", 1.0, 1.0);
        orphan[1] = CellValue::Null;
        table.push_row(orphan).unwrap();
        let mut partial = tenure_row("3400001", "APPLICATION", 0.0, 0.0);
        partial[6] = CellValue::Null;
        table.push_row(partial).unwrap();

        let grouped = group_sum(&table, &FILE_GROUP_KEYS, &[PARCEL_AREA]).unwrap();
        assert_eq!(grouped.row_count(), 2);
        assert_eq!(grouped.rows()[0][6], CellValue::Float(4.0));
    }

    #[test]
    fn missing_group_column_is_reported() {
        let table = ResultTable::new(["FILE_NBR"]);
        assert!(group_sum(&table, &FILE_GROUP_KEYS, &[PARCEL_AREA]).is_err());
    }

    #[test]
    fn zero_area_watershed_leaves_share_blank() {
        let grouped = aggregate_unique_files(&full_list(), 0.0).unwrap();
        assert!(grouped.rows().iter().all(|row| row[8].is_null()));
    }

    #[test]
    fn rounding_is_banker_style() {
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(0.375, 2), 0.38);
        assert_eq!(round_half_even(12.345678, 4), 12.3457);
    }

    proptest! {
        #[test]
        fn grouped_totals_match_input_totals(areas in prop::collection::vec((0u8..4, 0.0f64..1000.0), 0..40)) {
            let columns = FILE_GROUP_KEYS.iter().copied().chain([PARCEL_AREA, INTERSECTION_AREA]);
            let rows = areas
                .iter()
                .map(|(file, area)| tenure_row(&format!("34{file}"), "TENURE", *area, *area / 2.0))
                .collect();
            let table = ResultTable::new(columns).with_rows(rows).unwrap();
            let grouped = group_sum(&table, &FILE_GROUP_KEYS, &[PARCEL_AREA]).unwrap();

            let expected: f64 = areas.iter().map(|(_, area)| area).sum();
            let actual = grouped.numeric_sum(6);
            prop_assert!((expected - actual).abs() < 1e-6);
            let mut keys: Vec<_> = grouped.column_values(0).cloned().collect();
            let sorted = {
                let mut copy = keys.clone();
                copy.sort_by(|a, b| a.total_cmp(b));
                copy
            };
            prop_assert_eq!(&keys, &sorted);
            keys.dedup();
            prop_assert_eq!(keys.len(), grouped.row_count());
        }
    }
}
