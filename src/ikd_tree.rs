//! ## Incremental Kd‑tree Implementation
//!
//! This module provides a self-balancing, incrementally updatable Kd‑tree over 3D points,
//! aimed at workloads where the indexed point cloud changes continuously (e.g. LiDAR
//! odometry and mapping). Points are removed logically first and reclaimed in bulk when a
//! subtree is rebuilt, so single mutations stay cheap. Every node caches aggregates for its
//! subtree (size, invalid-point count, bounding box) which drive both rebuild scheduling and
//! search pruning. Insertions are voxel-downsampled: per voxel, only the point closest to
//! the voxel center is kept.
//!
//! ### Example
//!
//! ```
//! use ikd::geometry::{Aabb, Point3D};
//! use ikd::ikd_tree::IkdTree;
//!
//! let mut tree: IkdTree<Point3D<()>> = IkdTree::new(0.5, 0.7, 0.2, 10).unwrap();
//! tree.build(vec![
//!     Point3D::new(0.0, 0.0, 0.0, None),
//!     Point3D::new(1.0, 0.5, 0.2, None),
//!     Point3D::new(-0.3, 0.8, 0.4, None),
//! ]);
//!
//! let mut nearest = Vec::new();
//! tree.knn(&Point3D::new(0.1, 0.1, 0.1, None), 2, &mut nearest);
//! assert_eq!(nearest.len(), 2);
//! assert_eq!(nearest[0].x, 0.0);
//!
//! tree.delete_boxes(&[Aabb::new([-1.0, -1.0, -1.0], [0.5, 1.0, 1.0])]);
//! assert_eq!(tree.valid_count(), 1);
//! ```

use std::{cmp::Ordering, collections::BinaryHeap};

use ordered_float::OrderedFloat;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    errors::IkdError,
    geometry::{squared_distance, Aabb, Point3D, EPS},
};

/// Default invalid-fraction threshold above which a subtree is rebuilt.
pub const DEFAULT_DELETE_CRITERION: f64 = 0.5;
/// Default heavier-child-fraction threshold above which a subtree is rebuilt.
pub const DEFAULT_BALANCE_CRITERION: f64 = 0.7;
/// Default edge length of the downsampling voxel.
pub const DEFAULT_VOXEL_SIZE: f64 = 0.2;
/// Default subtree size below which rebuild checks are skipped.
pub const DEFAULT_MIN_REBUILD_SIZE: usize = 10;

/// Trait representing a point that can be stored in the incremental Kd‑tree.
///
/// A type implementing `IkdPoint` must provide its three coordinates; distance
/// and approximate-equality helpers are derived from them. Coordinate equality
/// is ε-approximate under [`EPS`].
pub trait IkdPoint: Clone + std::fmt::Debug {
    /// Returns the coordinate along the x axis.
    fn x(&self) -> f64;
    /// Returns the coordinate along the y axis.
    fn y(&self) -> f64;
    /// Returns the coordinate along the z axis.
    fn z(&self) -> f64;

    /// Returns the coordinate along the given axis (0, 1, or 2).
    fn coord(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x(),
            1 => self.y(),
            2 => self.z(),
            _ => unreachable!("division axis is always one of 0, 1, 2"),
        }
    }

    /// Returns the coordinates as a triple.
    fn position(&self) -> [f64; 3] {
        [self.x(), self.y(), self.z()]
    }

    /// Returns the squared Euclidean distance to another point.
    fn distance_sq(&self, other: &Self) -> f64 {
        squared_distance(self.position(), other.position())
    }

    /// Returns true if both points lie within [`EPS`] of each other on every axis.
    fn same_position(&self, other: &Self) -> bool {
        (self.x() - other.x()).abs() < EPS
            && (self.y() - other.y()).abs() < EPS
            && (self.z() - other.z()).abs() < EPS
    }
}

impl<T> IkdPoint for Point3D<T>
where
    T: std::fmt::Debug + Clone,
{
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
    fn z(&self) -> f64 {
        self.z
    }
}

/// Internal structure used to store items in the k‑nearest neighbor heap.
#[derive(Debug, Clone)]
struct HeapItem<P> {
    dist: OrderedFloat<f64>,
    point: P,
}

impl<P> PartialEq for HeapItem<P> {
    fn eq(&self, other: &Self) -> bool {
        self.dist.eq(&other.dist)
    }
}

impl<P> Eq for HeapItem<P> {}

impl<P> PartialOrd for HeapItem<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for HeapItem<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.cmp(&other.dist)
    }
}

/// A node of the incremental Kd‑tree.
///
/// `tree_size`, `invalid_count`, `tree_deleted`, and the coordinate ranges are
/// aggregates over the whole subtree rooted here, recomputed by `update` at the
/// end of every mutating visit. The ranges bound every pivot in the subtree,
/// including logically deleted ones, since those are only reclaimed on rebuild.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct IkdNode<P: IkdPoint> {
    point: P,
    division_axis: usize,
    left: Option<Box<IkdNode<P>>>,
    right: Option<Box<IkdNode<P>>>,
    tree_size: usize,
    invalid_count: usize,
    point_deleted: bool,
    tree_deleted: bool,
    need_rebuild: bool,
    range_min: [f64; 3],
    range_max: [f64; 3],
}

impl<P: IkdPoint> IkdNode<P> {
    fn new(point: P, division_axis: usize) -> Self {
        let position = point.position();
        IkdNode {
            point,
            division_axis,
            left: None,
            right: None,
            tree_size: 1,
            invalid_count: 0,
            point_deleted: false,
            tree_deleted: false,
            need_rebuild: false,
            range_min: position,
            range_max: position,
        }
    }
}

/// Thresholds deciding when a subtree must be rebuilt.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Criteria {
    delete: f64,
    balance: f64,
    min_rebuild_size: usize,
}

impl Criteria {
    /// Returns true if the subtree rooted at `node` is too stale or too lopsided.
    ///
    /// Subtrees below `min_rebuild_size` (in particular single nodes, which have
    /// no child to weigh) always count as balanced.
    fn needs_rebuild<P: IkdPoint>(&self, node: &IkdNode<P>) -> bool {
        if node.tree_size < self.min_rebuild_size {
            return false;
        }
        let heavier = match (node.left.as_deref(), node.right.as_deref()) {
            (None, None) => return false,
            (Some(left), None) => left.tree_size,
            (None, Some(right)) => right.tree_size,
            (Some(left), Some(right)) => left.tree_size.max(right.tree_size),
        };
        let delete_fraction = node.invalid_count as f64 / node.tree_size as f64;
        let balance_fraction = heavier as f64 / node.tree_size as f64;
        delete_fraction > self.delete
            || balance_fraction > self.balance
            || balance_fraction < 1.0 - self.balance
    }
}

/// Mutable tree state threaded through the recursive mutators.
struct OpCtx<'a, P> {
    criteria: Criteria,
    removed: &'a mut Vec<P>,
    downsample: Option<&'a mut Vec<P>>,
    range_deleted: &'a mut u64,
    rebuilds: &'a mut u64,
}

/// Incremental Kd‑tree over points implementing [`IkdPoint`].
///
/// The tree supports bulk (re)building, voxel-downsampled insertion, logical
/// deletion by point and by axis-aligned box, k‑nearest neighbor search, box and
/// radius search, and draining the queue of physically reclaimed points.
/// Deletions are logical until a rebuild reclaims the affected nodes; rebuilds
/// are triggered per subtree once its invalid fraction or its heavier-child
/// fraction crosses the configured criteria.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IkdTree<P: IkdPoint> {
    root: Option<Box<IkdNode<P>>>,
    criteria: Criteria,
    voxel_size: f64,
    removed: Vec<P>,
    downsample: Vec<P>,
    range_deleted: u64,
    rebuilds: u64,
}

impl<P: IkdPoint> Default for IkdTree<P> {
    fn default() -> Self {
        IkdTree {
            root: None,
            criteria: Criteria {
                delete: DEFAULT_DELETE_CRITERION,
                balance: DEFAULT_BALANCE_CRITERION,
                min_rebuild_size: DEFAULT_MIN_REBUILD_SIZE,
            },
            voxel_size: DEFAULT_VOXEL_SIZE,
            removed: Vec::new(),
            downsample: Vec::new(),
            range_deleted: 0,
            rebuilds: 0,
        }
    }
}

impl<P: IkdPoint> IkdTree<P> {
    /// Creates a new, empty incremental Kd-tree.
    ///
    /// # Arguments
    ///
    /// * `delete_criterion` - invalid fraction above which a subtree is rebuilt, in `(0, 1]`.
    /// * `balance_criterion` - heavier-child fraction above which a subtree is rebuilt, in `(0.5, 1)`.
    /// * `voxel_size` - edge length of the downsampling voxel, positive.
    /// * `min_rebuild_size` - subtree size below which rebuild checks are skipped.
    ///
    /// # Errors
    ///
    /// Returns `IkdError` if any parameter lies outside its valid range.
    pub fn new(
        delete_criterion: f64,
        balance_criterion: f64,
        voxel_size: f64,
        min_rebuild_size: usize,
    ) -> Result<Self, IkdError> {
        Self::validate_delete_criterion(delete_criterion)?;
        Self::validate_balance_criterion(balance_criterion)?;
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(IkdError::InvalidVoxelSize { value: voxel_size });
        }
        Ok(IkdTree {
            root: None,
            criteria: Criteria {
                delete: delete_criterion,
                balance: balance_criterion,
                min_rebuild_size,
            },
            voxel_size,
            removed: Vec::new(),
            downsample: Vec::new(),
            range_deleted: 0,
            rebuilds: 0,
        })
    }

    /// Replaces the contents of the tree with a balanced build over `points`.
    ///
    /// Any previous tree is discarded without feeding the removed-points queue.
    pub fn build(&mut self, mut points: Vec<P>) {
        info!("Building tree from {} points", points.len());
        self.root = Self::build_rec(&mut points);
    }

    /// Inserts points, downsampling each against the voxel it falls into.
    ///
    /// For every point, all live points in its voxel are purged and the one
    /// closest to the voxel center (among the purged points and the new one) is
    /// kept, so each voxel holds at most one point.
    pub fn insert(&mut self, points: Vec<P>) {
        let rebuilds_before = self.rebuilds;
        let count = points.len();
        info!("Inserting {} points", count);
        for point in points {
            self.insert_one(point);
        }
        debug!(
            "Insertion of {} points triggered {} rebuilds",
            count,
            self.rebuilds - rebuilds_before
        );
    }

    /// Logically deletes each point whose position matches within [`EPS`].
    ///
    /// A point with no live match is reported via `warn!` and skipped.
    pub fn delete_points(&mut self, points: &[P]) {
        let criteria = self.criteria;
        let mut misses = 0usize;
        for point in points {
            let mut ctx = OpCtx {
                criteria,
                removed: &mut self.removed,
                downsample: None,
                range_deleted: &mut self.range_deleted,
                rebuilds: &mut self.rebuilds,
            };
            if !Self::delete_point_rec(&mut self.root, point, true, &mut ctx) {
                warn!("Failed to delete point {:?}: no matching live point", point);
                misses += 1;
            }
        }
        debug!("Deleted {} of {} points", points.len() - misses, points.len());
    }

    /// Logically deletes every live point inside each of the given boxes.
    pub fn delete_boxes(&mut self, regions: &[Aabb]) {
        let criteria = self.criteria;
        let deleted_before = self.range_deleted;
        for region in regions {
            let mut ctx = OpCtx {
                criteria,
                removed: &mut self.removed,
                downsample: None,
                range_deleted: &mut self.range_deleted,
                rebuilds: &mut self.rebuilds,
            };
            Self::delete_range_rec(&mut self.root, region, true, &mut ctx);
        }
        debug!(
            "Range deletion removed {} points across {} boxes",
            self.range_deleted - deleted_before,
            regions.len()
        );
    }

    /// Finds the `k` live points nearest to `query`.
    ///
    /// `out` is cleared and then filled with at most `k` points in ascending
    /// distance order. `k = 0` or an empty tree yields an empty buffer.
    pub fn knn(&self, query: &P, k: usize, out: &mut Vec<P>) {
        out.clear();
        if k == 0 {
            return;
        }
        debug!("Performing kNN search for {:?} with k={}", query, k);
        let mut heap: BinaryHeap<HeapItem<P>> = BinaryHeap::new();
        Self::knn_rec(self.root.as_deref(), query, k, &mut heap);
        let mut found: Vec<(f64, P)> = heap
            .into_iter()
            .map(|item| (item.dist.into_inner(), item.point))
            .collect();
        found.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        out.extend(found.into_iter().map(|(_dist, point)| point));
    }

    /// Collects every live point inside the given box into `out` (cleared first).
    pub fn box_search(&self, region: &Aabb, out: &mut Vec<P>) {
        out.clear();
        Self::box_search_rec(self.root.as_deref(), region, out);
    }

    /// Collects every live point within `radius` of `center` into `out` (cleared first).
    pub fn radius_search(&self, center: &P, radius: f64, out: &mut Vec<P>) {
        out.clear();
        Self::radius_search_rec(self.root.as_deref(), center, radius * radius, out);
    }

    /// Emits all live points in-order into `out` (cleared first).
    pub fn flatten(&self, out: &mut Vec<P>) {
        out.clear();
        Self::collect_live(self.root.as_deref(), out);
    }

    /// Moves out the queue of physically reclaimed points, leaving it empty.
    pub fn take_removed(&mut self) -> Vec<P> {
        std::mem::take(&mut self.removed)
    }

    /// Returns the number of live points in the tree.
    pub fn valid_count(&self) -> usize {
        self.root
            .as_deref()
            .map_or(0, |root| root.tree_size - root.invalid_count)
    }

    /// Returns the number of stored pivots, including logically deleted ones.
    pub fn size(&self) -> usize {
        self.root.as_deref().map_or(0, |root| root.tree_size)
    }

    /// Returns true if the tree holds no live points.
    pub fn is_empty(&self) -> bool {
        self.valid_count() == 0
    }

    /// Returns the number of partial rebuilds performed since construction.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Returns the number of points logically deleted by range deletions since
    /// construction (including voxel purges during insertion).
    pub fn range_deleted_count(&self) -> u64 {
        self.range_deleted
    }

    /// Reconfigures the delete criterion.
    ///
    /// # Errors
    ///
    /// Returns `IkdError::InvalidDeleteCriterion` if the value lies outside `(0, 1]`.
    pub fn set_delete_criterion(&mut self, value: f64) -> Result<(), IkdError> {
        Self::validate_delete_criterion(value)?;
        self.criteria.delete = value;
        Ok(())
    }

    /// Reconfigures the balance criterion.
    ///
    /// # Errors
    ///
    /// Returns `IkdError::InvalidBalanceCriterion` if the value lies outside `(0.5, 1)`.
    pub fn set_balance_criterion(&mut self, value: f64) -> Result<(), IkdError> {
        Self::validate_balance_criterion(value)?;
        self.criteria.balance = value;
        Ok(())
    }

    fn validate_delete_criterion(value: f64) -> Result<(), IkdError> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(())
        } else {
            Err(IkdError::InvalidDeleteCriterion { value })
        }
    }

    fn validate_balance_criterion(value: f64) -> Result<(), IkdError> {
        if value.is_finite() && value > 0.5 && value < 1.0 {
            Ok(())
        } else {
            Err(IkdError::InvalidBalanceCriterion { value })
        }
    }

    fn insert_one(&mut self, point: P) {
        let criteria = self.criteria;
        let voxel = Aabb::voxel_of(point.position(), self.voxel_size);
        let center = voxel.center();
        self.downsample.clear();
        let mut ctx = OpCtx {
            criteria,
            removed: &mut self.removed,
            downsample: Some(&mut self.downsample),
            range_deleted: &mut self.range_deleted,
            rebuilds: &mut self.rebuilds,
        };
        Self::delete_range_rec(&mut self.root, &voxel, true, &mut ctx);

        // Keep whichever voxel occupant sits closest to the voxel center.
        let mut candidate = point;
        let mut best = squared_distance(candidate.position(), center);
        for resident in self.downsample.drain(..) {
            let dist = squared_distance(resident.position(), center);
            if dist < best {
                best = dist;
                candidate = resident;
            }
        }
        debug!("Adding point {:?}", candidate);
        let mut ctx = OpCtx {
            criteria,
            removed: &mut self.removed,
            downsample: None,
            range_deleted: &mut self.range_deleted,
            rebuilds: &mut self.rebuilds,
        };
        Self::add_rec(&mut self.root, candidate, true, &mut ctx);
    }

    /// Recomputes the cached aggregates of `node` from its pivot and children.
    fn update(node: &mut IkdNode<P>) {
        let mut tree_size = 1;
        let mut invalid_count = usize::from(node.point_deleted);
        let mut tree_deleted = node.point_deleted;
        let mut range_min = node.point.position();
        let mut range_max = range_min;
        for child in node.left.iter().chain(node.right.iter()) {
            tree_size += child.tree_size;
            invalid_count += child.invalid_count;
            tree_deleted = tree_deleted && child.tree_deleted;
            for axis in 0..3 {
                range_min[axis] = range_min[axis].min(child.range_min[axis]);
                range_max[axis] = range_max[axis].max(child.range_max[axis]);
            }
        }
        node.tree_size = tree_size;
        node.invalid_count = invalid_count;
        node.tree_deleted = tree_deleted;
        node.range_min = range_min;
        node.range_max = range_max;
    }

    /// Propagates a lazy subtree-deleted mark to the direct children.
    ///
    /// Must run at the top of every mutating visit, before recursing.
    fn push_down(node: &mut IkdNode<P>) {
        if !node.tree_deleted {
            return;
        }
        for child in node.left.iter_mut().chain(node.right.iter_mut()) {
            child.point_deleted = true;
            child.tree_deleted = true;
            child.invalid_count = child.tree_size;
        }
    }

    /// Builds a balanced subtree over `points`, splitting each level along the
    /// axis of maximum variance at the median.
    fn build_rec(points: &mut [P]) -> Option<Box<IkdNode<P>>> {
        if points.is_empty() {
            return None;
        }
        let axis = Self::max_variance_axis(points);
        let mid = (points.len() - 1) / 2;
        points.select_nth_unstable_by(mid, |a, b| {
            a.coord(axis)
                .partial_cmp(&b.coord(axis))
                .unwrap_or(Ordering::Equal)
        });
        let mut node = Box::new(IkdNode::new(points[mid].clone(), axis));
        let (left_slice, rest) = points.split_at_mut(mid);
        let right_slice = &mut rest[1..];
        node.left = Self::build_rec(left_slice);
        node.right = Self::build_rec(right_slice);
        Self::update(&mut node);
        Some(node)
    }

    fn max_variance_axis(points: &[P]) -> usize {
        let len = points.len() as f64;
        let mut mean = [0.0; 3];
        for point in points {
            for axis in 0..3 {
                mean[axis] += point.coord(axis);
            }
        }
        for value in &mut mean {
            *value /= len;
        }
        let mut variance = [0.0; 3];
        for point in points {
            for axis in 0..3 {
                variance[axis] += (point.coord(axis) - mean[axis]).powi(2);
            }
        }
        let mut best = 0;
        for axis in 1..3 {
            if variance[axis] > variance[best] {
                best = axis;
            }
        }
        best
    }

    fn add_rec(
        slot: &mut Option<Box<IkdNode<P>>>,
        point: P,
        is_root: bool,
        ctx: &mut OpCtx<'_, P>,
    ) {
        let Some(node) = slot.as_deref_mut() else {
            *slot = Some(Box::new(IkdNode::new(point, 0)));
            return;
        };
        Self::push_down(node);
        if point.coord(node.division_axis) < node.point.coord(node.division_axis) {
            Self::add_rec(&mut node.left, point, false, ctx);
        } else {
            Self::add_rec(&mut node.right, point, false, ctx);
        }
        Self::update(node);
        Self::maintain(slot, is_root, ctx);
    }

    fn delete_point_rec(
        slot: &mut Option<Box<IkdNode<P>>>,
        target: &P,
        is_root: bool,
        ctx: &mut OpCtx<'_, P>,
    ) -> bool {
        let Some(node) = slot.as_deref_mut() else {
            return false;
        };
        Self::push_down(node);
        if node.tree_deleted {
            return false;
        }
        if !node.point_deleted && node.point.same_position(target) {
            node.point_deleted = true;
            node.invalid_count += 1;
            if node.invalid_count == node.tree_size {
                node.tree_deleted = true;
            }
            return true;
        }
        let found = if target.coord(node.division_axis) < node.point.coord(node.division_axis) {
            Self::delete_point_rec(&mut node.left, target, false, ctx)
        } else {
            Self::delete_point_rec(&mut node.right, target, false, ctx)
        };
        Self::update(node);
        Self::maintain(slot, is_root, ctx);
        found
    }

    fn delete_range_rec(
        slot: &mut Option<Box<IkdNode<P>>>,
        region: &Aabb,
        is_root: bool,
        ctx: &mut OpCtx<'_, P>,
    ) {
        let Some(node) = slot.as_deref_mut() else {
            return;
        };
        Self::push_down(node);
        if node.tree_deleted {
            return;
        }
        if region.disjoint(&node.range_min, &node.range_max) {
            return;
        }
        if region.encloses(&node.range_min, &node.range_max) {
            *ctx.range_deleted += node.tree_size as u64;
            match &mut ctx.downsample {
                // Downsampling wants the purged points back, so the subtree is
                // reclaimed physically instead of being lazily marked.
                Some(buffer) => Self::reclaim(slot.take(), false, buffer, ctx.removed),
                None => {
                    node.tree_deleted = true;
                    node.point_deleted = true;
                    node.invalid_count = node.tree_size;
                }
            }
            return;
        }
        if !node.point_deleted && region.contains(node.point.position()) {
            node.point_deleted = true;
            node.invalid_count += 1;
            *ctx.range_deleted += 1;
            if let Some(buffer) = &mut ctx.downsample {
                buffer.push(node.point.clone());
            }
        }
        Self::delete_range_rec(&mut node.left, region, false, ctx);
        Self::delete_range_rec(&mut node.right, region, false, ctx);
        Self::update(node);
        Self::maintain(slot, is_root, ctx);
    }

    /// Applies the rebuild scheduling policy at `slot` after its aggregates have
    /// been refreshed: rebuild a flagged child if this node is fine, or this
    /// whole subtree if it is flagged and happens to be the root.
    fn maintain(slot: &mut Option<Box<IkdNode<P>>>, is_root: bool, ctx: &mut OpCtx<'_, P>) {
        let Some(node) = slot.as_deref_mut() else {
            return;
        };
        node.need_rebuild = ctx.criteria.needs_rebuild(node);
        if !node.need_rebuild {
            let mut child_rebuilt = false;
            if node.left.as_deref().is_some_and(|child| child.need_rebuild) {
                Self::rebuild_subtree(&mut node.left, ctx);
                child_rebuilt = true;
            }
            if node.right.as_deref().is_some_and(|child| child.need_rebuild) {
                Self::rebuild_subtree(&mut node.right, ctx);
                child_rebuilt = true;
            }
            if child_rebuilt {
                Self::update(node);
            }
        } else if is_root {
            Self::rebuild_subtree(slot, ctx);
        }
    }

    /// Rebuilds the subtree at `slot` in place: live points are flattened out,
    /// dead pivots go to the removed-points queue, and a balanced subtree is
    /// built over the survivors.
    fn rebuild_subtree(slot: &mut Option<Box<IkdNode<P>>>, ctx: &mut OpCtx<'_, P>) {
        let Some(node) = slot.as_deref() else {
            return;
        };
        debug!(
            "Rebuilding subtree of {} points ({} invalid)",
            node.tree_size, node.invalid_count
        );
        let mut live = Vec::with_capacity(node.tree_size - node.invalid_count);
        Self::reclaim(slot.take(), false, &mut live, ctx.removed);
        *slot = Self::build_rec(&mut live);
        *ctx.rebuilds += 1;
    }

    /// Physically destroys a subtree, sorting its pivots in-order into `live`
    /// and `removed` according to their (possibly inherited) deletion marks.
    fn reclaim(
        node: Option<Box<IkdNode<P>>>,
        inherited_deleted: bool,
        live: &mut Vec<P>,
        removed: &mut Vec<P>,
    ) {
        let Some(node) = node else {
            return;
        };
        let IkdNode {
            point,
            left,
            right,
            point_deleted,
            tree_deleted,
            ..
        } = *node;
        let subtree_deleted = inherited_deleted || tree_deleted;
        Self::reclaim(left, subtree_deleted, live, removed);
        if point_deleted || subtree_deleted {
            removed.push(point);
        } else {
            live.push(point);
        }
        Self::reclaim(right, subtree_deleted, live, removed);
    }

    /// Returns the squared distance from `query` to the bounding box of the
    /// subtree at `node`, or +∞ for an absent subtree.
    fn bounds_dist_sq(node: Option<&IkdNode<P>>, query: &P) -> f64 {
        let Some(node) = node else {
            return f64::INFINITY;
        };
        let mut dist = 0.0;
        for axis in 0..3 {
            let coord = query.coord(axis);
            if coord < node.range_min[axis] {
                dist += (coord - node.range_min[axis]).powi(2);
            } else if coord > node.range_max[axis] {
                dist += (coord - node.range_max[axis]).powi(2);
            }
        }
        dist
    }

    fn knn_rec(
        node: Option<&IkdNode<P>>,
        query: &P,
        k: usize,
        heap: &mut BinaryHeap<HeapItem<P>>,
    ) {
        let Some(node) = node else {
            return;
        };
        if node.tree_deleted {
            return;
        }
        if !node.point_deleted {
            let dist = OrderedFloat(query.distance_sq(&node.point));
            if heap.len() < k {
                heap.push(HeapItem {
                    dist,
                    point: node.point.clone(),
                });
            } else if let Some(top) = heap.peek() {
                if dist < top.dist {
                    heap.pop();
                    heap.push(HeapItem {
                        dist,
                        point: node.point.clone(),
                    });
                }
            }
        }
        let dist_left = Self::bounds_dist_sq(node.left.as_deref(), query);
        let dist_right = Self::bounds_dist_sq(node.right.as_deref(), query);
        let (near, near_dist, far, far_dist) = if dist_left <= dist_right {
            (node.left.as_deref(), dist_left, node.right.as_deref(), dist_right)
        } else {
            (node.right.as_deref(), dist_right, node.left.as_deref(), dist_left)
        };
        if heap.len() < k
            || heap
                .peek()
                .map(|top| near_dist < top.dist.into_inner())
                .unwrap_or(true)
        {
            Self::knn_rec(near, query, k, heap);
        }
        if heap.len() < k
            || heap
                .peek()
                .map(|top| far_dist < top.dist.into_inner())
                .unwrap_or(true)
        {
            Self::knn_rec(far, query, k, heap);
        }
    }

    fn box_search_rec(node: Option<&IkdNode<P>>, region: &Aabb, out: &mut Vec<P>) {
        let Some(node) = node else {
            return;
        };
        if node.tree_deleted || region.disjoint(&node.range_min, &node.range_max) {
            return;
        }
        if !node.point_deleted && region.contains(node.point.position()) {
            out.push(node.point.clone());
        }
        Self::box_search_rec(node.left.as_deref(), region, out);
        Self::box_search_rec(node.right.as_deref(), region, out);
    }

    fn radius_search_rec(node: Option<&IkdNode<P>>, center: &P, radius_sq: f64, out: &mut Vec<P>) {
        let Some(node) = node else {
            return;
        };
        if node.tree_deleted || Self::bounds_dist_sq(Some(node), center) > radius_sq {
            return;
        }
        if !node.point_deleted && center.distance_sq(&node.point) <= radius_sq {
            out.push(node.point.clone());
        }
        Self::radius_search_rec(node.left.as_deref(), center, radius_sq, out);
        Self::radius_search_rec(node.right.as_deref(), center, radius_sq, out);
    }

    fn collect_live(node: Option<&IkdNode<P>>, out: &mut Vec<P>) {
        let Some(node) = node else {
            return;
        };
        if node.tree_deleted {
            return;
        }
        Self::collect_live(node.left.as_deref(), out);
        if !node.point_deleted {
            out.push(node.point.clone());
        }
        Self::collect_live(node.right.as_deref(), out);
    }
}
