//! Natural-order comparison, used for hook-script sort order and kernel
//! release-token comparison alike.
//!
//! Splits a string into alternating numeric and non-numeric runs; numeric
//! runs compare by integer value, non-numeric runs compare lexicographically.

use std::cmp::Ordering;

fn split_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let is_digit = bytes[start].is_ascii_digit();
        let mut end = start + 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() == is_digit {
            end += 1;
        }
        runs.push(&s[start..end]);
        start = end;
    }
    runs
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ra = split_runs(a);
    let rb = split_runs(b);

    for pair in ra.iter().zip(rb.iter()) {
        let (x, y) = pair;
        let ord = match (x.as_bytes().first().map(u8::is_ascii_digit), y.as_bytes().first().map(u8::is_ascii_digit)) {
            (Some(true), Some(true)) => {
                let xi: u128 = x.parse().unwrap_or(0);
                let yi: u128 = y.parse().unwrap_or(0);
                xi.cmp(&yi).then_with(|| x.cmp(y))
            }
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    ra.len().cmp(&rb.len())
}

pub fn sort_natural<T, F: Fn(&T) -> &str>(items: &mut [T], key: F) {
    items.sort_by(|a, b| natural_cmp(key(a), key(b)));
}
