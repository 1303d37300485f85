use serde::{Deserialize, Serialize};

/// Inclusive acceptance window. A missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds { min: None, max: None };

    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// NaN never satisfies a configured side.
    pub fn accepts(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// One tracked metric for one file: raw values plus deltas against the
/// previous accepted value.
///
/// Invariant: `delta.len() == delta_normalized.len() == values.len().saturating_sub(1)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSeries {
    relations: Vec<f64>,
    bounds: Bounds,
    values: Vec<f64>,
    delta: Vec<f64>,
    delta_normalized: Vec<f64>,
}

impl ValueSeries {
    /// Series whose delta is the plain difference to the previous value.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Series whose delta is the nearest deviation from one of `relations`.
    pub fn with_relations(relations: &[f64], bounds: Bounds) -> Self {
        Self {
            relations: relations.to_vec(),
            bounds,
            ..Self::default()
        }
    }

    /// Push a value. Values outside the bounds are dropped and return `false`.
    pub fn push(&mut self, value: f64) -> bool {
        if !self.bounds.accepts(value) {
            return false;
        }
        self.values.push(value);

        let n = self.values.len();
        if n == 1 {
            return true;
        }
        let previous = self.values[n - 2];

        let delta = nearest_relation_delta(&self.relations, value, previous);
        self.delta.push(delta);
        self.delta_normalized.push(delta / value.max(previous));
        true
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn delta(&self) -> &[f64] {
        &self.delta
    }

    pub fn delta_normalized(&self) -> &[f64] {
        &self.delta_normalized
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// `current × r − previous` with the smallest magnitude over `relations`.
/// Ties keep the earliest relation. Without relations, the plain difference.
pub(crate) fn nearest_relation_delta(relations: &[f64], current: f64, previous: f64) -> f64 {
    let Some((first, rest)) = relations.split_first() else {
        return current - previous;
    };
    let mut best = current * first - previous;
    for r in rest {
        let candidate = current * r - previous;
        if candidate.abs() < best.abs() {
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_bounds_inclusive() {
        let b = Bounds::new(Some(0.0), Some(400.0));
        assert!(b.accepts(0.0));
        assert!(b.accepts(400.0));
        assert!(!b.accepts(-1.0));
        assert!(!b.accepts(400.5));
        assert!(Bounds::UNBOUNDED.accepts(-1e9));
        assert!(Bounds::new(None, Some(10.0)).accepts(-5.0));
    }

    #[test]
    fn test_first_value_has_no_delta() {
        let mut s = ValueSeries::plain();
        assert!(s.push(0.5));
        assert_eq!(s.values(), &[0.5]);
        assert!(s.delta().is_empty());
        assert!(s.delta_normalized().is_empty());
    }

    #[test]
    fn test_plain_delta_is_difference() {
        let mut s = ValueSeries::plain();
        for v in [0.5, 0.8, 0.4] {
            s.push(v);
        }
        assert_eq!(s.delta().len(), 2);
        assert_close(s.delta()[0], 0.3);
        assert_close(s.delta()[1], -0.4);
        assert_close(s.delta_normalized()[0], 0.3 / 0.8);
        assert_close(s.delta_normalized()[1], -0.4 / 0.8);
    }

    #[test]
    fn test_relation_delta_example() {
        let mut s = ValueSeries::with_relations(&[0.5, 1.0, 2.0], Bounds::UNBOUNDED);
        s.push(100.0);
        s.push(180.0);
        // candidates: -10, 80, 260
        assert_close(s.delta()[0], -10.0);
        assert_close(s.delta_normalized()[0], -10.0 / 180.0);
    }

    #[test]
    fn test_relation_tie_keeps_earliest() {
        // previous 100, current 100: r=0.5 → -50, r=1.5 → +50; tie keeps -50
        assert_close(nearest_relation_delta(&[0.5, 1.5], 100.0, 100.0), -50.0);
        assert_close(nearest_relation_delta(&[1.5, 0.5], 100.0, 100.0), 50.0);
    }

    #[test]
    fn test_no_relations_is_plain_difference() {
        assert_close(nearest_relation_delta(&[], 180.0, 100.0), 80.0);
    }

    #[test]
    fn test_nan_rejected_by_configured_bounds() {
        let mut s = ValueSeries::with_relations(&[1.0], Bounds::new(Some(0.0), Some(400.0)));
        assert!(!s.push(f64::NAN));
        assert!(s.is_empty());
        assert!(!Bounds::new(None, Some(1500.0)).accepts(f64::NAN));
        assert!(!Bounds::new(Some(0.0), None).accepts(f64::NAN));
    }

    #[test]
    fn test_relation_exact_match_is_zero() {
        // current is half the previous: r=2 matches exactly
        let rel = [0.25, 0.33, 0.5, 1.0, 2.0, 3.0, 4.0];
        assert_close(nearest_relation_delta(&rel, 200.0, 400.0), 0.0);
    }

    #[test]
    fn test_out_of_bounds_values_leave_no_trace() {
        let mut s = ValueSeries::with_relations(&[1.0], Bounds::new(Some(10.0), Some(400.0)));
        assert!(s.push(100.0));
        assert!(!s.push(500.0));
        assert!(!s.push(5.0));
        assert!(s.push(120.0));
        assert_eq!(s.values(), &[100.0, 120.0]);
        assert_eq!(s.delta().len(), 1);
        // delta computed against the previous *accepted* value
        assert_close(s.delta()[0], 20.0);
    }

    #[test]
    fn test_delta_length_invariant() {
        let mut s = ValueSeries::with_relations(&[0.5, 1.0, 2.0], Bounds::new(None, Some(300.0)));
        for (i, v) in [50.0, 400.0, 120.0, 90.0, 1000.0, 60.0, 240.0].into_iter().enumerate() {
            s.push(v);
            assert_eq!(s.delta().len(), s.len().saturating_sub(1), "after push {i}");
            assert_eq!(s.delta_normalized().len(), s.delta().len());
        }
    }
}
