use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::types::Position;

type BucketKey = (i32, i32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located<K> {
    pub id: K,
    pub position: Position,
}

/// Uniform bucket grid over any id → position mapping. Owns nothing but ids and
/// positions; callers keep the entity data.
#[derive(Clone, Debug)]
pub struct ProximityIndex<K> {
    cell_size: i32,
    entries: HashMap<K, (Position, BucketKey)>,
    buckets: HashMap<BucketKey, HashSet<K>>,
}

impl<K> ProximityIndex<K>
where
    K: Clone + Eq + Hash,
{
    pub fn new(cell_size: i32) -> Self {
        Self {
            cell_size: cell_size.max(1),
            entries: HashMap::new(),
            buckets: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
    }

    pub fn position(&self, id: &K) -> Option<Position> {
        self.entries.get(id).map(|(position, _)| *position)
    }

    pub fn upsert(&mut self, id: K, position: Position) {
        let bucket = self.bucket_of(position);
        match self.entries.get_mut(&id) {
            Some((current, current_bucket)) if *current_bucket == bucket => {
                *current = position;
            }
            Some((current, current_bucket)) => {
                let old_bucket = *current_bucket;
                *current = position;
                *current_bucket = bucket;
                self.detach(&id, old_bucket);
                self.buckets.entry(bucket).or_default().insert(id);
            }
            None => {
                self.entries.insert(id.clone(), (position, bucket));
                self.buckets.entry(bucket).or_default().insert(id);
            }
        }
    }

    pub fn remove(&mut self, id: &K) -> Option<Position> {
        let (position, bucket) = self.entries.remove(id)?;
        self.detach(id, bucket);
        Some(position)
    }

    /// Everything in a bucket that intersects the rectangle centred on `center`.
    /// Membership is bucket-granular: entities just outside the rectangle but in a
    /// touched bucket are included.
    pub fn query_viewport(&self, center: Position, width: i32, height: i32) -> Vec<Located<K>> {
        let ((min_bx, min_by), (max_bx, max_by)) = self.viewport_buckets(center, width, height);

        let mut out = Vec::new();
        for by in min_by..=max_by {
            for bx in min_bx..=max_bx {
                let Some(members) = self.buckets.get(&(bx, by)) else {
                    continue;
                };
                for id in members {
                    if let Some((position, _)) = self.entries.get(id) {
                        out.push(Located {
                            id: id.clone(),
                            position: *position,
                        });
                    }
                }
            }
        }
        out
    }

    /// Whether `query_viewport(center, width, height)` would report an entity at
    /// `position`.
    pub fn viewport_contains(
        &self,
        center: Position,
        width: i32,
        height: i32,
        position: Position,
    ) -> bool {
        let ((min_bx, min_by), (max_bx, max_by)) = self.viewport_buckets(center, width, height);
        let (bx, by) = self.bucket_of(position);
        (min_bx..=max_bx).contains(&bx) && (min_by..=max_by).contains(&by)
    }

    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    pub fn query_radius(&self, center: Position, radius: i32) -> Vec<Located<K>> {
        let radius = radius.max(0);
        let limit = radius as i64 * radius as i64;
        self.query_viewport(center, radius * 2, radius * 2)
            .into_iter()
            .filter(|entity| {
                let dx = (entity.position.x - center.x) as i64;
                let dy = (entity.position.y - center.y) as i64;
                dx * dx + dy * dy <= limit
            })
            .collect()
    }

    fn viewport_buckets(&self, center: Position, width: i32, height: i32) -> (BucketKey, BucketKey) {
        let half_w = width.max(0) / 2;
        let half_h = height.max(0) / 2;
        (
            self.bucket_of(Position::new(center.x - half_w, center.y - half_h)),
            self.bucket_of(Position::new(center.x + half_w, center.y + half_h)),
        )
    }

    fn bucket_of(&self, position: Position) -> BucketKey {
        (
            position.x.div_euclid(self.cell_size),
            position.y.div_euclid(self.cell_size),
        )
    }

    fn detach(&mut self, id: &K, bucket: BucketKey) {
        if let Some(members) = self.buckets.get_mut(&bucket) {
            members.remove(id);
            if members.is_empty() {
                self.buckets.remove(&bucket);
            }
        }
    }
}
