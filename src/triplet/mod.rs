//! Triplet loss and distance-based face verification over encodings.

use crate::util::math::l2_norm;
use crate::util::{DlError, DlResult};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Default margin between positive and negative distances.
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Default distance below which two encodings are the same person.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Summed triplet loss over a batch of `(m, d)` encodings.
///
/// Per row: `max(|a - p|^2 - |a - n|^2 + alpha, 0)`.
pub fn triplet_loss(
    anchor: ArrayView2<'_, f64>,
    positive: ArrayView2<'_, f64>,
    negative: ArrayView2<'_, f64>,
    alpha: f64,
) -> DlResult<f64> {
    if positive.shape() != anchor.shape() {
        return Err(DlError::shape("positive", anchor.shape(), positive.shape()));
    }
    if negative.shape() != anchor.shape() {
        return Err(DlError::shape("negative", anchor.shape(), negative.shape()));
    }

    let pos_dist = (&anchor - &positive).mapv(|v| v * v).sum_axis(Axis(1));
    let neg_dist = (&anchor - &negative).mapv(|v| v * v).sum_axis(Axis(1));
    let basic_loss = pos_dist - neg_dist + alpha;
    Ok(basic_loss.mapv(|v| v.max(0.0)).sum())
}

/// Insertion-ordered mapping from names to reference encodings.
#[derive(Clone, Debug, Default)]
pub struct FaceDatabase {
    entries: Vec<(String, Array1<f64>)>,
}

impl FaceDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the encoding for `name`.
    ///
    /// Replacing keeps the original insertion position.
    pub fn insert(&mut self, name: impl Into<String>, encoding: Array1<f64>) -> DlResult<()> {
        if let Some((_, first)) = self.entries.first() {
            if first.len() != encoding.len() {
                return Err(DlError::shape("encoding", first.shape(), encoding.shape()));
            }
        }
        let name = name.into();
        match self.entries.iter_mut().find(|entry| entry.0 == name) {
            Some(entry) => entry.1 = encoding,
            None => self.entries.push((name, encoding)),
        }
        Ok(())
    }

    /// Returns the encoding stored for `name`.
    pub fn get(&self, name: &str) -> Option<&Array1<f64>> {
        self.entries
            .iter()
            .find(|entry| entry.0 == name)
            .map(|(_, e)| e)
    }

    /// Returns the number of identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no identities are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, encoding)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }
}

/// Result of [`verify`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verification {
    /// Euclidean distance to the claimed identity.
    pub distance: f64,
    /// True when the distance is below the threshold.
    pub is_match: bool,
}

/// Result of [`who_is_it`].
#[derive(Clone, Debug, PartialEq)]
pub struct Identification {
    /// Distance to the closest stored encoding.
    pub distance: f64,
    /// Closest identity, or `None` when it is farther than the threshold.
    pub identity: Option<String>,
}

fn distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> DlResult<f64> {
    if a.len() != b.len() {
        return Err(DlError::shape("encoding", b.shape(), a.shape()));
    }
    let diff = &a - &b;
    Ok(l2_norm(diff.view()))
}

/// Checks whether `encoding` belongs to `identity`.
pub fn verify(
    encoding: ArrayView1<'_, f64>,
    identity: &str,
    db: &FaceDatabase,
    threshold: f64,
) -> DlResult<Verification> {
    let reference = db
        .get(identity)
        .ok_or_else(|| DlError::UnknownIdentity(identity.to_owned()))?;
    let distance = distance(encoding, reference.view())?;
    Ok(Verification {
        distance,
        is_match: distance < threshold,
    })
}

/// Finds the closest identity to `encoding`.
///
/// The first stored identity wins distance ties.
pub fn who_is_it(
    encoding: ArrayView1<'_, f64>,
    db: &FaceDatabase,
    threshold: f64,
) -> DlResult<Identification> {
    if db.is_empty() {
        return Err(DlError::InvalidInput("face database is empty"));
    }

    let mut best: Option<(&str, f64)> = None;
    for (name, reference) in db.iter() {
        let dist = distance(encoding, reference.view())?;
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((name, dist));
        }
    }

    let (name, distance) = best.ok_or(DlError::InvalidInput("face database is empty"))?;
    let identity = if distance > threshold {
        None
    } else {
        Some(name.to_owned())
    };
    Ok(Identification { distance, identity })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn triplet_loss_matches_hand_computation() {
        let anchor = array![[0.0, 0.0], [1.0, 1.0]];
        let positive = array![[0.1, 0.0], [1.0, 2.0]];
        let negative = array![[1.0, 0.0], [1.0, 1.5]];
        // row 0: 0.01 - 1.0 + 0.2 < 0 -> 0; row 1: 1.0 - 0.25 + 0.2 = 0.95
        let loss = triplet_loss(anchor.view(), positive.view(), negative.view(), DEFAULT_ALPHA)
            .unwrap();
        assert!((loss - 0.95).abs() < 1e-12);
    }

    #[test]
    fn triplet_loss_is_alpha_per_row_for_identical_encodings() {
        let a = array![[0.3, -0.2, 0.5], [1.0, 0.0, 0.0]];
        let loss = triplet_loss(a.view(), a.view(), a.view(), 0.2).unwrap();
        assert!((loss - 0.4).abs() < 1e-12);
    }

    #[test]
    fn triplet_loss_rejects_shape_mismatch() {
        let a = array![[0.0, 0.0]];
        let n = array![[0.0, 0.0, 0.0]];
        assert!(triplet_loss(a.view(), a.view(), n.view(), 0.2).is_err());
    }

    fn database() -> FaceDatabase {
        let mut db = FaceDatabase::new();
        db.insert("younes", array![0.0, 0.0, 1.0]).unwrap();
        db.insert("kian", array![1.0, 0.0, 0.0]).unwrap();
        db
    }

    #[test]
    fn verify_thresholds_distance() {
        let db = database();
        let close = verify(array![0.0, 0.3, 1.0].view(), "younes", &db, 0.7).unwrap();
        assert!(close.is_match);
        assert!((close.distance - 0.3).abs() < 1e-12);

        let far = verify(array![0.0, 0.3, 1.0].view(), "kian", &db, 0.7).unwrap();
        assert!(!far.is_match);

        assert_eq!(
            verify(array![0.0, 0.0, 0.0].view(), "bertrand", &db, 0.7).unwrap_err(),
            DlError::UnknownIdentity("bertrand".into())
        );
    }

    #[test]
    fn who_is_it_finds_nearest_or_none() {
        let db = database();
        let found = who_is_it(array![0.9, 0.1, 0.0].view(), &db, 0.7).unwrap();
        assert_eq!(found.identity.as_deref(), Some("kian"));

        let unknown = who_is_it(array![0.0, 5.0, 0.0].view(), &db, 0.7).unwrap();
        assert_eq!(unknown.identity, None);
        assert!(unknown.distance > 0.7);
    }

    #[test]
    fn who_is_it_breaks_ties_by_insertion_and_accepts_threshold_distance() {
        let mut db = FaceDatabase::new();
        db.insert("a", array![1.0, 0.0]).unwrap();
        db.insert("b", array![-1.0, 0.0]).unwrap();

        let found = who_is_it(array![0.0, 0.0].view(), &db, 1.0).unwrap();
        assert_eq!(found.distance, 1.0);
        assert_eq!(found.identity.as_deref(), Some("a"));

        let beyond = who_is_it(array![0.0, 0.0].view(), &db, 0.99).unwrap();
        assert_eq!(beyond.identity, None);
    }

    #[test]
    fn database_replaces_in_place_and_checks_length() {
        let mut db = database();
        db.insert("younes", array![0.0, 1.0, 0.0]).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.iter().next().map(|(n, _)| n), Some("younes"));
        assert!(db.insert("andrew", array![1.0]).is_err());
    }
}
