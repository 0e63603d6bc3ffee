/*!

A read-only nearest-neighbour index over a fixed set of coordinates.

Items are bucketed into H3 cells at a few resolutions, coarse to fine, which gives a tree whose
nodes are the cells that hold at least one item. Every node stores the cell centre and the
great-circle distance from that centre to the farthest item below it. The triangle inequality
then bounds the distance from a query point to anything inside a node, and queries walk the tree
best-first, skipping nodes whose bound is already worse than the current answer. The radius comes
from the items themselves and not from the cell outline, so the bound holds even though H3
children are not strictly nested inside their parents.

Ties are broken by insertion order, so two queries over indexes built from the same input always
return the same sequence.

There is no mutation API. When the facility set changes the index is rebuilt from scratch with
[`SpatialIndex::build`].

*/

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

use h3o::{LatLng, Resolution};

use crate::coordinates::great_circle_km;
use crate::Coordinates;

/// Cell resolutions of the tree levels, coarse to fine. Items hang below the last level.
const LEVELS: [Resolution; 4] = [
    Resolution::Zero,
    Resolution::Three,
    Resolution::Six,
    Resolution::Nine,
];

/// Absorbs rounding in the haversine formula when bounds are compared with item distances. The
/// formula loses precision close to antipodal points, hence a full metre.
const BOUND_SLACK_KM: f64 = 1e-3;

#[derive(Clone, Debug)]
struct Entry<T> {
    item: T,
    coordinates: Coordinates,
    position: LatLng,
    /// Position in the input sequence, used as a tie breaker.
    slot: usize,
}

#[derive(Clone, Debug)]
enum Children {
    Cells(Vec<usize>),
    Entries(Vec<usize>),
}

#[derive(Clone, Debug)]
struct Node {
    centre: Coordinates,
    /// Distance from `centre` to the farthest entry below this node.
    radius_km: f64,
    children: Children,
}

impl Node {
    fn lower_bound(&self, point: &Coordinates) -> f64 {
        great_circle_km(point, &self.centre) - self.radius_km - BOUND_SLACK_KM
    }
}

#[derive(Clone, Debug)]
pub struct CellTree<T> {
    entries: Vec<Entry<T>>,
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

/// Either an explicit empty sentinel or a populated tree. Every query on [`SpatialIndex::Empty`]
/// returns an empty result; "no nearby facilities" is a normal outcome, not an error.
#[derive(Clone, Debug)]
pub enum SpatialIndex<T> {
    Empty,
    Tree(CellTree<T>),
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        SpatialIndex::Empty
    }
}

#[derive(Copy, Clone, Debug)]
struct Candidate {
    distance: f64,
    slot: usize,
    entry: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.slot.cmp(&other.slot))
    }
}

#[derive(Copy, Clone, Debug)]
struct Pending {
    lower_bound: f64,
    node: usize,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lower_bound
            .total_cmp(&other.lower_bound)
            .then(self.node.cmp(&other.node))
    }
}

impl<T> CellTree<T> {
    /// Groups `members` by their cell at `LEVELS[level]` and pushes one node per cell, recursing
    /// into the finer levels. Returns the indices of the nodes created at this level.
    fn grow(&mut self, members: Vec<usize>, level: usize) -> Vec<usize> {
        let resolution = LEVELS[level];
        let mut cells: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for entry in members {
            let cell = self.entries[entry].position.to_cell(resolution);
            cells.entry(u64::from(cell)).or_default().push(entry);
        }

        let mut created = Vec::with_capacity(cells.len());
        for (cell, members) in cells {
            let centre = h3o::CellIndex::try_from(cell)
                .map(LatLng::from)
                .map(|c| Coordinates::new(c.lat(), c.lng()))
                .unwrap_or(self.entries[members[0]].coordinates);
            let radius_km = members
                .iter()
                .map(|&entry| great_circle_km(&centre, &self.entries[entry].coordinates))
                .fold(0.0, f64::max);
            let children = if level + 1 < LEVELS.len() {
                Children::Cells(self.grow(members, level + 1))
            } else {
                Children::Entries(members)
            };
            self.nodes.push(Node {
                centre,
                radius_km,
                children,
            });
            created.push(self.nodes.len() - 1);
        }
        created
    }

    fn candidate(&self, point: &Coordinates, entry: usize) -> Candidate {
        let found = &self.entries[entry];
        Candidate {
            distance: great_circle_km(point, &found.coordinates),
            slot: found.slot,
            entry,
        }
    }

    fn nearest_into(&self, point: &Coordinates, k: usize) -> Vec<Candidate> {
        let mut best: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        let mut frontier: BinaryHeap<Reverse<Pending>> = self
            .roots
            .iter()
            .map(|&node| {
                Reverse(Pending {
                    lower_bound: self.nodes[node].lower_bound(point),
                    node,
                })
            })
            .collect();

        while let Some(Reverse(pending)) = frontier.pop() {
            // Equal bounds are still visited: a tied item may have an earlier slot.
            if best.len() == k
                && best
                    .peek()
                    .is_some_and(|worst| pending.lower_bound > worst.distance)
            {
                break;
            }
            match &self.nodes[pending.node].children {
                Children::Cells(children) => {
                    for &node in children {
                        frontier.push(Reverse(Pending {
                            lower_bound: self.nodes[node].lower_bound(point),
                            node,
                        }));
                    }
                }
                Children::Entries(entries) => {
                    for &entry in entries {
                        let candidate = self.candidate(point, entry);
                        if best.len() < k {
                            best.push(candidate);
                        } else if best.peek().is_some_and(|worst| candidate < *worst) {
                            best.pop();
                            best.push(candidate);
                        }
                    }
                }
            }
        }
        best.into_sorted_vec()
    }

    fn radius_into(&self, point: &Coordinates, radius_km: f64) -> Vec<Candidate> {
        let mut found = Vec::new();
        let mut stack = self.roots.clone();
        while let Some(node) = stack.pop() {
            let node = &self.nodes[node];
            if node.lower_bound(point) > radius_km {
                continue;
            }
            match &node.children {
                Children::Cells(children) => stack.extend(children.iter().copied()),
                Children::Entries(entries) => found.extend(
                    entries
                        .iter()
                        .map(|&entry| self.candidate(point, entry))
                        .filter(|candidate| candidate.distance <= radius_km),
                ),
            }
        }
        found.sort_unstable();
        found
    }
}

impl<T: Copy> SpatialIndex<T> {
    /// Builds an index over `items`. An empty input yields [`SpatialIndex::Empty`]. Items whose
    /// coordinates are not finite are left out.
    pub fn build<I>(items: I) -> Self
    where
        I: IntoIterator<Item = (T, Coordinates)>,
    {
        let entries: Vec<Entry<T>> = items
            .into_iter()
            .enumerate()
            .filter_map(|(slot, (item, coordinates))| {
                LatLng::new(coordinates.latitude, coordinates.longitude)
                    .ok()
                    .map(|position| Entry {
                        item,
                        coordinates,
                        position,
                        slot,
                    })
            })
            .collect();
        if entries.is_empty() {
            return SpatialIndex::Empty;
        }
        let members = (0..entries.len()).collect();
        let mut tree = CellTree {
            entries,
            nodes: Vec::new(),
            roots: Vec::new(),
        };
        tree.roots = tree.grow(members, 0);
        SpatialIndex::Tree(tree)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            SpatialIndex::Empty => 0,
            SpatialIndex::Tree(tree) => tree.entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, SpatialIndex::Empty)
    }

    /// The `k` closest items to `point`, ordered by ascending great-circle distance (km). A `k`
    /// larger than the index is clamped to the index size.
    #[must_use]
    pub fn k_nearest(&self, point: &Coordinates, k: usize) -> Vec<(T, f64)> {
        let SpatialIndex::Tree(tree) = self else {
            return Vec::new();
        };
        let k = k.min(tree.entries.len());
        if k == 0 {
            return Vec::new();
        }
        tree.nearest_into(point, k)
            .into_iter()
            .map(|candidate| (tree.entries[candidate.entry].item, candidate.distance))
            .collect()
    }

    /// The single closest item, if any.
    #[must_use]
    pub fn nearest(&self, point: &Coordinates) -> Option<(T, f64)> {
        self.k_nearest(point, 1).into_iter().next()
    }

    /// All items within `radius_km` of `point`, closest first.
    #[must_use]
    pub fn within_radius(&self, point: &Coordinates, radius_km: f64) -> Vec<T> {
        let SpatialIndex::Tree(tree) = self else {
            return Vec::new();
        };
        if radius_km.is_nan() || radius_km < 0.0 {
            return Vec::new();
        }
        tree.radius_into(point, radius_km)
            .into_iter()
            .map(|candidate| tree.entries[candidate.entry].item)
            .collect()
    }
}
