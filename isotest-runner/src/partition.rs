//! Stable partitioning of test cases into contiguous per-test,
//! per-suite runs.
//!
//! A stable two-level insertion partition: scan forward to the first
//! unprocessed element, treat it as the start of a new "active test" run,
//! stably move every later element belonging to the same test up against
//! it, then repeatedly pick the next active test as the first remaining
//! element whose test belongs to the same suite, until no more same-suite
//! tests remain; then resume from the first remaining element overall.
//! Tests-only and suites-only callers use the one-level version, grouping
//! directly on the single key they care about.

/// An item a partitioner can group by test and by suite.
pub trait Partitionable {
    /// The key identifying which test this item belongs to.
    fn test_key(&self) -> &str;
    /// The key identifying which suite this item belongs to.
    fn suite_key(&self) -> &str;
}

/// Reorder `items` so elements sharing a `test_key` are contiguous, and
/// tests sharing a `suite_key` are contiguous among themselves, while
/// preserving relative order wherever those two constraints allow.
pub fn partition_testcases<T: Partitionable>(items: Vec<T>) -> Vec<T> {
    partition_two_level(items, |a, b| a.test_key() == b.test_key(), |a, b| {
        a.suite_key() == b.suite_key()
    })
}

/// Reorder `items` so elements sharing a single key are contiguous,
/// preserving relative order otherwise. Used for tests-only or
/// suites-only entry points, where only one level of grouping applies.
pub fn partition_single_level<T>(items: Vec<T>, same_group: impl Fn(&T, &T) -> bool) -> Vec<T> {
    partition_one_level(items, same_group)
}

fn partition_one_level<T>(mut items: Vec<T>, same_group: impl Fn(&T, &T) -> bool) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    while !items.is_empty() {
        let anchor = items.remove(0);
        let mut run = vec![];
        let mut i = 0;
        while i < items.len() {
            if same_group(&anchor, &items[i]) {
                run.push(items.remove(i));
            } else {
                i += 1;
            }
        }
        out.push(anchor);
        out.extend(run);
    }
    out
}

fn partition_two_level<T>(
    mut items: Vec<T>,
    same_test: impl Fn(&T, &T) -> bool,
    same_suite: impl Fn(&T, &T) -> bool,
) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    while !items.is_empty() {
        let mut active = items.remove(0);
        loop {
            let mut run = vec![];
            let mut i = 0;
            while i < items.len() {
                if same_test(&active, &items[i]) {
                    run.push(items.remove(i));
                } else {
                    i += 1;
                }
            }
            out.push(active);
            out.extend(run);

            // Find the next same-suite test to continue this suite's run.
            let next_in_suite = items
                .iter()
                .position(|item| same_suite(out.last().unwrap(), item));
            match next_in_suite {
                Some(idx) => active = items.remove(idx),
                None => break,
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Case {
        label: &'static str,
        test: &'static str,
        suite: &'static str,
    }

    impl Partitionable for Case {
        fn test_key(&self) -> &str {
            self.test
        }
        fn suite_key(&self) -> &str {
            self.suite
        }
    }

    fn case(label: &'static str, test: &'static str, suite: &'static str) -> Case {
        Case { label, test, suite }
    }

    #[test]
    fn groups_tests_within_a_suite_and_preserves_suite_arrival_order() {
        // a1 b1 a2 c1 b2 a3, a/b in suite S, c in suite T.
        let input = vec![
            case("a1", "A", "S"),
            case("b1", "B", "S"),
            case("a2", "A", "S"),
            case("c1", "C", "T"),
            case("b2", "B", "S"),
            case("a3", "A", "S"),
        ];
        let out = partition_testcases(input);
        let labels: Vec<&str> = out.iter().map(|c| c.label).collect();
        assert_eq!(labels, vec!["a1", "a2", "a3", "b1", "b2", "c1"]);
    }

    #[test]
    fn single_test_run_is_left_untouched() {
        let input = vec![case("x1", "X", "S"), case("x2", "X", "S")];
        let out = partition_testcases(input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn one_level_partition_groups_by_single_key() {
        let input = vec!["a", "b", "a", "c", "b"];
        let out = partition_single_level(input, |a, b| a == b);
        assert_eq!(out, vec!["a", "a", "b", "b", "c"]);
    }
}
