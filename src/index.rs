//! Composite-keyed storage of partial contributions.
//!
//! The index has two parallel structures:
//!
//! * single receiver: (phase, receiver grid point) -> (source grid point -> bucket)
//! * receiver pair: (phase, receiver A grid point, receiver B grid point) ->
//!   (source grid point -> bucket)
//!
//! Buckets are append-only lists of [PartialContribution]. Merging two indices concatenates
//! matching buckets. There is no deduplication: merging the same fragment twice doubles its
//! effect, so callers must deliver each fragment at most once.

use crate::aggregator::RayAggregator;
use crate::contribution::PartialContribution;
use crate::error::AggregationError;
use crate::types::{GridIndex, SeismicPhase};

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use std::hash::Hash;

/// Key of the single receiver structure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SingleReceiverKey {
    pub phase: SeismicPhase,
    pub receiver: GridIndex,
}

/// Key of the receiver-pair structure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ReceiverPairKey {
    pub phase: SeismicPhase,
    pub receiver_a: GridIndex,
    pub receiver_b: GridIndex,
}

/// Receiver level key of either structure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BucketKey {
    Single(SingleReceiverKey),
    Pair(ReceiverPairKey),
}

impl BucketKey {
    /// Seismic phase of the key.
    pub fn phase(&self) -> SeismicPhase {
        match self {
            BucketKey::Single(key) => key.phase,
            BucketKey::Pair(key) => key.phase,
        }
    }
}

/// Buckets of one receiver level key, by source grid point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceBuckets {
    buckets: HashMap<GridIndex, Vec<PartialContribution>>,
}

impl SourceBuckets {
    /// The bucket for a source grid point, if any contribution was stored under it.
    pub fn get(&self, source: GridIndex) -> Option<&[PartialContribution]> {
        self.buckets.get(&source).map(Vec::as_slice)
    }

    /// Number of source buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True if there are no source buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// One of the two structures, remembering bucket creation order.
#[derive(Clone, Debug, PartialEq)]
struct BucketTable<K: Eq + Hash> {
    receivers: HashMap<K, SourceBuckets>,
    order: Vec<(K, GridIndex)>,
}

impl<K: Copy + Eq + Hash> BucketTable<K> {
    fn new() -> Self {
        BucketTable {
            receivers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Append contributions to a bucket, creating intermediate levels on demand.
    fn append<I>(&mut self, key: K, source: GridIndex, contributions: I)
    where
        I: IntoIterator<Item = PartialContribution>,
    {
        let sources = self.receivers.entry(key).or_default();
        let bucket = match sources.buckets.entry(source) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.order.push((key, source));
                entry.insert(Vec::new())
            }
        };
        bucket.extend(contributions);
    }

    fn get(&self, key: &K) -> Option<&SourceBuckets> {
        self.receivers.get(key)
    }

    fn bucket(&self, key: &K, source: GridIndex) -> Option<&[PartialContribution]> {
        self.get(key).and_then(|sources| sources.get(source))
    }

    /// Buckets in creation order.
    fn buckets(&self) -> impl Iterator<Item = (K, GridIndex, &[PartialContribution])> + '_ {
        self.order.iter().filter_map(move |(key, source)| {
            self.bucket(key, *source)
                .map(|bucket| (*key, *source, bucket))
        })
    }

    /// Move all buckets out of this table in creation order.
    fn into_buckets(mut self) -> impl Iterator<Item = (K, GridIndex, Vec<PartialContribution>)> {
        let order = std::mem::take(&mut self.order);
        order.into_iter().filter_map(move |(key, source)| {
            self.receivers
                .get_mut(&key)
                .and_then(|sources| sources.buckets.remove(&source))
                .map(|bucket| (key, source, bucket))
        })
    }

    fn contribution_count(&self) -> usize {
        self.receivers
            .values()
            .flat_map(|sources| sources.buckets.values())
            .map(Vec::len)
            .sum()
    }
}

/// Index of partial contributions for single receiver and receiver-pair rays.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialResultIndex {
    single: BucketTable<SingleReceiverKey>,
    pair: BucketTable<ReceiverPairKey>,
}

impl Default for PartialResultIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialResultIndex {
    /// Return a new, empty PartialResultIndex.
    pub fn new() -> Self {
        PartialResultIndex {
            single: BucketTable::new(),
            pair: BucketTable::new(),
        }
    }

    /// Append a single receiver contribution.
    pub fn put_single(
        &mut self,
        phase: SeismicPhase,
        receiver: GridIndex,
        source: GridIndex,
        contribution: PartialContribution,
    ) {
        let key = SingleReceiverKey { phase, receiver };
        self.single.append(key, source, [contribution]);
    }

    /// Append a receiver-pair contribution.
    pub fn put_pair(
        &mut self,
        phase: SeismicPhase,
        receiver_a: GridIndex,
        receiver_b: GridIndex,
        source: GridIndex,
        contribution: PartialContribution,
    ) {
        let key = ReceiverPairKey {
            phase,
            receiver_a,
            receiver_b,
        };
        self.pair.append(key, source, [contribution]);
    }

    /// Append a whole bucket of contributions under a key.
    pub fn append_bucket(
        &mut self,
        key: BucketKey,
        source: GridIndex,
        contributions: Vec<PartialContribution>,
    ) {
        match key {
            BucketKey::Single(key) => self.single.append(key, source, contributions),
            BucketKey::Pair(key) => self.pair.append(key, source, contributions),
        }
    }

    /// Source buckets of a single receiver key. Absent keys are normal: influence stencils are
    /// local while the index spans the whole grid.
    pub fn lookup_single(
        &self,
        phase: SeismicPhase,
        receiver: GridIndex,
    ) -> Option<&SourceBuckets> {
        self.single.get(&SingleReceiverKey { phase, receiver })
    }

    /// Source buckets of a receiver-pair key.
    pub fn lookup_pair(
        &self,
        phase: SeismicPhase,
        receiver_a: GridIndex,
        receiver_b: GridIndex,
    ) -> Option<&SourceBuckets> {
        self.pair.get(&ReceiverPairKey {
            phase,
            receiver_a,
            receiver_b,
        })
    }

    /// Bucket addressed by a key and source grid point.
    pub fn bucket(&self, key: &BucketKey, source: GridIndex) -> Option<&[PartialContribution]> {
        match key {
            BucketKey::Single(key) => self.single.bucket(key, source),
            BucketKey::Pair(key) => self.pair.bucket(key, source),
        }
    }

    /// All buckets: single receiver buckets, then receiver-pair buckets, each in creation order.
    pub fn buckets(&self) -> impl Iterator<Item = (BucketKey, GridIndex, &[PartialContribution])> {
        let single = self
            .single
            .buckets()
            .map(|(key, source, bucket)| (BucketKey::Single(key), source, bucket));
        let pair = self
            .pair
            .buckets()
            .map(|(key, source, bucket)| (BucketKey::Pair(key), source, bucket));
        single.chain(pair)
    }

    /// Merge another index into this one.
    ///
    /// Every bucket of `other` is appended to the matching (or newly created) bucket of `self`.
    pub fn merge(&mut self, other: PartialResultIndex) {
        for (key, source, bucket) in other.single.into_buckets() {
            self.single.append(key, source, bucket);
        }
        for (key, source, bucket) in other.pair.into_buckets() {
            self.pair.append(key, source, bucket);
        }
    }

    /// The portion of this index read by a ray's merges.
    ///
    /// Merging the returned index into the ray yields the same result as merging the full index,
    /// which makes it suitable for shipping a single ray's inputs to another process.
    pub fn restrict_to(&self, ray: &RayAggregator) -> Result<PartialResultIndex, AggregationError> {
        let phase = ray.identity().phase;
        let mut scoped = PartialResultIndex::new();
        for influence in ray.single_receiver_plan()? {
            let key = BucketKey::Single(SingleReceiverKey {
                phase,
                receiver: influence.receiver_a.point,
            });
            copy_bucket(self, &mut scoped, key, influence.source.point);
        }
        for influence in ray.receiver_pair_plan()? {
            let key = BucketKey::Pair(ReceiverPairKey {
                phase,
                receiver_a: influence.receiver_a.point,
                receiver_b: influence.receiver_b.point,
            });
            copy_bucket(self, &mut scoped, key, influence.source.point);
        }
        Ok(scoped)
    }

    /// Total number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.single.order.len() + self.pair.order.len()
    }

    /// Total number of contributions.
    pub fn contribution_count(&self) -> usize {
        self.single.contribution_count() + self.pair.contribution_count()
    }

    /// True if the index holds no buckets.
    pub fn is_empty(&self) -> bool {
        self.bucket_count() == 0
    }
}

/// Copy one bucket from `from` into `to` unless `to` already has it.
fn copy_bucket(
    from: &PartialResultIndex,
    to: &mut PartialResultIndex,
    key: BucketKey,
    source: GridIndex,
) {
    if to.bucket(&key, source).is_some() {
        return;
    }
    if let Some(bucket) = from.bucket(&key, source) {
        to.append_bucket(key, source, bucket.to_vec());
    }
}
