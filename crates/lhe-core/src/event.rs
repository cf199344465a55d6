//! Per-event particle records.

use std::collections::BTreeSet;

use crate::kinematics::FourVector;

/// Set of particle type ids (PDG codes).
pub type IdSet = BTreeSet<i32>;

/// A particle extracted from an event record.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Signed PDG particle code.
    pub type_id: i32,
    /// Four-momentum; `None` if it could not be reconstructed.
    pub vector: Option<FourVector>,
}

impl Particle {
    /// Particle with a known four-momentum.
    pub fn new(type_id: i32, vector: FourVector) -> Self {
        Self { type_id, vector: Some(vector) }
    }
}

/// The particles of one event that survived the include filter, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    /// Retained particles.
    pub particles: Vec<Particle>,
}

impl Event {
    /// Build from a particle list.
    pub fn new(particles: Vec<Particle>) -> Self {
        Self { particles }
    }

    /// Particles whose id is in `ids`, preserving file order.
    ///
    /// The event itself is never modified, so several selections over the
    /// same event are independent of each other.
    pub fn select<'a>(&'a self, ids: &'a IdSet) -> impl Iterator<Item = &'a Particle> + 'a {
        self.particles.iter().filter(move |p| ids.contains(&p.type_id))
    }

    /// `true` if no particle was retained.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

/// Call `f` for every unordered pair `(i, j)` with `i < j`.
///
/// Stops early and returns `Ok(true)` as soon as `f` does.
pub(crate) fn for_each_pair<T, E>(
    items: &[T],
    mut f: impl FnMut(&T, &T) -> Result<bool, E>,
) -> Result<bool, E> {
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            if f(&items[i], &items[j])? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_keeps_order_and_does_not_consume() {
        let ev = Event::new(vec![
            Particle::new(13, FourVector::new(1.0, 0.0, 0.0, 1.0)),
            Particle::new(22, FourVector::new(0.0, 1.0, 0.0, 1.0)),
            Particle::new(-13, FourVector::new(2.0, 0.0, 0.0, 2.0)),
        ]);
        let muons: IdSet = [13, -13].into_iter().collect();
        let photons: IdSet = [22].into_iter().collect();

        let ids: Vec<i32> = ev.select(&muons).map(|p| p.type_id).collect();
        assert_eq!(ids, vec![13, -13]);
        assert_eq!(ev.select(&photons).count(), 1);
        assert_eq!(ev.select(&muons).count(), 2);
        assert_eq!(ev.particles.len(), 3);
    }

    #[test]
    fn pairs_are_unordered_and_exhaustive() {
        let mut seen = Vec::new();
        let hit = for_each_pair::<_, ()>(&[1, 2, 3], |a, b| {
            seen.push((*a, *b));
            Ok(false)
        })
        .unwrap();
        assert!(!hit);
        assert_eq!(seen, vec![(1, 2), (1, 3), (2, 3)]);

        let mut calls = 0;
        let hit = for_each_pair::<_, ()>(&[1, 2, 3], |_, _| {
            calls += 1;
            Ok(true)
        })
        .unwrap();
        assert!(hit);
        assert_eq!(calls, 1);
    }
}
