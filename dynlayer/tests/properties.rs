use dynlayer::{memory::MemoryDriver, prelude::*};
use proptest::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn seeded(values: &[i32]) -> Collection {
    let connection = Connection::new(MemoryDriver::new());
    let numbers = connection.database("props").collection("numbers");

    for (position, value) in values.iter().enumerate() {
        numbers
            .insert(&json!({ "position": position, "value": value }).into())
            .unwrap();
    }

    numbers
}

fn values_of(cursor: Cursor) -> Vec<f64> {
    cursor
        .into_iter()
        .map(|document| {
            document
                .unwrap()
                .get("value")
                .and_then(DynamicValue::as_f64)
                .unwrap()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sorted_pages_match_a_local_sort(
        values in prop::collection::vec(-50i32..50, 0..24),
        skip in 0u64..8,
        limit in 0u64..8,
        descending in any::<bool>(),
    ) {
        init_tracing();
        let numbers = seeded(&values);
        let direction = if descending { SortDirection::Desc } else { SortDirection::Asc };

        let cursor = numbers
            .find(&DynamicValue::Null).unwrap()
            .sort_by("value", direction).unwrap()
            .sort_by("position", SortDirection::Asc).unwrap()
            .skip(skip).unwrap()
            .limit(limit).unwrap();

        let size = cursor.size().unwrap();
        prop_assert_eq!(cursor.count().unwrap(), values.len() as u64);

        let mut expected = values.iter().map(|value| f64::from(*value)).collect::<Vec<_>>();
        if descending {
            expected.sort_by(|a, b| b.total_cmp(a));
        } else {
            expected.sort_by(f64::total_cmp);
        }
        let expected = expected
            .into_iter()
            .skip(skip as usize)
            .take(if limit == 0 { usize::MAX } else { limit as usize })
            .collect::<Vec<_>>();

        prop_assert_eq!(size, expected.len() as u64);
        prop_assert_eq!(values_of(cursor), expected);
    }

    #[test]
    fn filters_agree_with_a_local_scan(
        values in prop::collection::vec(-20i32..20, 0..24),
        threshold in -20i32..20,
    ) {
        let numbers = seeded(&values);
        let query: DynamicValue = json!({ "value": { "$gte": threshold } }).into();

        let expected = values.iter().filter(|value| **value >= threshold).count() as u64;

        prop_assert_eq!(numbers.count(&query).unwrap(), expected);
        prop_assert_eq!(numbers.find(&query).unwrap().to_array().unwrap().len() as u64, expected);
    }

    #[test]
    fn copies_replay_the_same_results(values in prop::collection::vec(any::<i16>(), 0..16)) {
        let values = values.into_iter().map(i32::from).collect::<Vec<_>>();
        let numbers = seeded(&values);

        let mut cursor = numbers.find(&DynamicValue::Null).unwrap().sort_by("position", SortDirection::Asc).unwrap();
        let first = cursor.to_array().unwrap();

        prop_assert_eq!(cursor.status(), CursorStatus::Exhausted);
        prop_assert_eq!(cursor.copy().to_array().unwrap(), first);
    }
}
