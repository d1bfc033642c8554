//! Pairwise distance evaluation.
//!
//! Turns the centroids of one frame's detections into the set of detection
//! indices that stand closer than the configured minimum distance to at least one
//! other detection. Pure functions, no state between frames.

use std::collections::BTreeSet;

use ndarray::Array2;
use serde::Serialize;

/// Symmetric matrix of Euclidean distances between centroids.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    distances: Array2<f32>,
}

impl DistanceMatrix {
    pub fn from_centroids(centroids: &[(f32, f32)]) -> Self {
        let n = centroids.len();
        let mut distances = Array2::<f32>::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let (xi, yi) = centroids[i];
                let (xj, yj) = centroids[j];
                let d = ((xi - xj).powi(2) + (yi - yj).powi(2)).sqrt();
                distances[[i, j]] = d;
                distances[[j, i]] = d;
            }
        }
        Self { distances }
    }

    /// Number of centroids (rows).
    pub fn len(&self) -> usize {
        self.distances.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        self.distances.get([i, j]).copied()
    }

    /// Indices of every pair in the upper triangle closer than `threshold`.
    pub fn violations(&self, threshold: f32) -> ViolationSet {
        let mut set = ViolationSet::default();
        let n = self.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if self.distances[[i, j]] < threshold {
                    set.indices.insert(i);
                    set.indices.insert(j);
                }
            }
        }
        set
    }
}

/// Indices of detections within the threshold distance of another detection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ViolationSet {
    indices: BTreeSet<usize>,
}

impl ViolationSet {
    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// Number of people involved in at least one violation.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }
}

impl FromIterator<usize> for ViolationSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            indices: iter.into_iter().collect(),
        }
    }
}

/// Flag every centroid that lies strictly closer than `threshold` to another one.
///
/// Fewer than two centroids never violate. Two centroids exactly `threshold`
/// apart are not a violation.
pub fn evaluate(centroids: &[(f32, f32)], threshold: f32) -> ViolationSet {
    if centroids.len() < 2 {
        return ViolationSet::default();
    }
    DistanceMatrix::from_centroids(centroids).violations(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(indices: &[usize]) -> ViolationSet {
        indices.iter().copied().collect()
    }

    #[test]
    fn fewer_than_two_centroids_never_violate() {
        assert!(evaluate(&[], 10.0).is_empty());
        assert!(evaluate(&[(3.0, 4.0)], 1000.0).is_empty());
    }

    #[test]
    fn close_pair_is_flagged() {
        assert_eq!(evaluate(&[(0.0, 0.0), (5.0, 0.0)], 10.0), set(&[0, 1]));
    }

    #[test]
    fn distant_pair_is_safe() {
        assert!(evaluate(&[(0.0, 0.0), (20.0, 0.0)], 10.0).is_empty());
    }

    #[test]
    fn isolated_person_is_not_flagged() {
        let result = evaluate(&[(0.0, 0.0), (5.0, 0.0), (100.0, 100.0)], 10.0);
        assert_eq!(result, set(&[0, 1]));
        assert!(!result.contains(2));
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        assert!(evaluate(&[(0.0, 0.0), (10.0, 0.0)], 10.0).is_empty());
        assert_eq!(evaluate(&[(0.0, 0.0), (9.999, 0.0)], 10.0), set(&[0, 1]));
        // 3-4-5 triangle lands exactly on the boundary too
        assert!(evaluate(&[(0.0, 0.0), (3.0, 4.0)], 5.0).is_empty());
    }

    #[test]
    fn three_mutually_close_people_count_once_each() {
        let result = evaluate(&[(0.0, 0.0), (3.0, 0.0), (6.0, 0.0)], 10.0);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn every_flagged_index_has_a_close_partner() {
        let centroids = [
            (0.0, 0.0),
            (12.0, 5.0),
            (40.0, 40.0),
            (44.0, 41.0),
            (200.0, 10.0),
            (13.0, 9.0),
        ];
        let threshold = 15.0;
        let matrix = DistanceMatrix::from_centroids(&centroids);
        let result = evaluate(&centroids, threshold);

        for i in result.iter() {
            let partnered = (0..centroids.len())
                .any(|j| j != i && matrix.get(i, j).is_some_and(|d| d < threshold));
            assert!(partnered, "index {i} flagged without a partner");
        }
        assert!(!result.contains(4));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let centroids = [(1.0, 1.0), (2.0, 2.0), (50.0, 50.0), (51.0, 49.0)];
        assert_eq!(evaluate(&centroids, 5.0), evaluate(&centroids, 5.0));
    }

    #[test]
    fn matrix_is_symmetric_with_zero_diagonal() {
        let matrix = DistanceMatrix::from_centroids(&[(0.0, 0.0), (3.0, 4.0), (6.0, 8.0)]);
        assert_eq!(matrix.len(), 3);
        for i in 0..3 {
            assert_eq!(matrix.get(i, i), Some(0.0));
            for j in 0..3 {
                assert_eq!(matrix.get(i, j), matrix.get(j, i));
            }
        }
        assert_eq!(matrix.get(0, 1), Some(5.0));
        assert_eq!(matrix.get(0, 2), Some(10.0));
        assert_eq!(matrix.get(0, 3), None);
    }
}
