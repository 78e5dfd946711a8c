//! Detecting items that appeared since the previous refresh

use serde_json::Value;

/// The formatted `current` items whose `keys` match no `previous` item
pub fn new_items<T>(
    previous: &[T],
    current: &[T],
    format: impl Fn(&T) -> Value,
    keys: &[&str],
) -> Vec<Value> {
    let project = |formatted: &Value| -> Vec<Value> {
        keys.iter()
            .map(|k| formatted.get(k).cloned().unwrap_or(Value::Null))
            .collect()
    };

    let known: Vec<Vec<Value>> = previous.iter().map(|p| project(&format(p))).collect();

    current
        .iter()
        .map(&format)
        .filter(|formatted| {
            let key = project(formatted);
            !known.iter().any(|k| *k == key)
        })
        .collect()
}

/// Like [`new_items`], reporting nothing when either side is missing
///
/// A missing side is a first refresh or a failed category.
pub fn compare_data<T>(
    previous: Option<&[T]>,
    current: Option<&[T]>,
    format: impl Fn(&T) -> Value,
    keys: &[&str],
) -> Vec<Value> {
    match (previous, current) {
        (Some(previous), Some(current)) => new_items(previous, current, format, keys),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Clone)]
    struct Delay {
        date: &'static str,
        minutes: u32,
        justified: bool,
    }

    fn format(delay: &Delay) -> Value {
        json!({"date": delay.date, "minutes": delay.minutes, "justified": delay.justified})
    }

    const KEYS: &[&str] = &["date", "minutes"];

    #[test]
    fn test_new_items_ignores_non_key_fields() {
        let previous = vec![Delay {
            date: "2026-03-02T08:05:00",
            minutes: 5,
            justified: false,
        }];
        let current = vec![
            Delay {
                justified: true,
                ..previous[0].clone()
            },
            Delay {
                date: "2026-03-03T08:10:00",
                minutes: 10,
                justified: false,
            },
        ];

        let added = new_items(&previous, &current, format, KEYS);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0]["minutes"], 10);
    }

    #[test]
    fn test_removed_items_are_not_reported() {
        let previous = vec![Delay {
            date: "2026-03-02T08:05:00",
            minutes: 5,
            justified: false,
        }];
        assert!(new_items(&previous, &[], format, KEYS).is_empty());
    }

    #[test]
    fn test_compare_data_needs_both_sides() {
        let items = vec![Delay {
            date: "2026-03-02T08:05:00",
            minutes: 5,
            justified: false,
        }];

        assert!(compare_data(None, Some(&items[..]), format, KEYS).is_empty());
        assert!(compare_data(Some(&items[..]), None, format, KEYS).is_empty());
        assert_eq!(
            compare_data(Some(&[][..]), Some(&items[..]), format, KEYS).len(),
            1
        );
    }
}
