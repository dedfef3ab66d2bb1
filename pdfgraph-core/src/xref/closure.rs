//! Reachability walk over the indirect-object graph.
//!
//! The walk recurses along reference edges, recording for each object the
//! fewest hops it was reached with. Without a hop limit every object is
//! descended once, so cycles (page ↔ parent, outline siblings) terminate.
//! With a limit an object is descended again when a shorter path to it
//! turns up, since its children may then fall within the limit. Recursion is
//! capped: an object met deeper than the cap is pushed onto an overflow
//! worklist and walked again from depth zero once the current descent has
//! unwound, until the worklist is empty. Stack usage is therefore bounded by
//! the cap no matter how deep the document nests.

use super::reference::IndirectReference;
use crate::objects::ObjectId;
use std::collections::{BTreeMap, BTreeSet};

/// Recursion depth after which descents are deferred to the overflow worklist.
pub const MAX_RECURSION_DEPTH: usize = 1000;

pub(crate) struct ClosureWalk {
    pub reachable: BTreeSet<ObjectId>,
    /// Edges whose target has no table entry.
    pub dangling: BTreeSet<ObjectId>,
    /// Number of times the overflow worklist was used.
    pub deferred: usize,
}

pub(crate) struct ClosureWalker<'a> {
    entries: &'a BTreeMap<ObjectId, IndirectReference>,
    max_hops: Option<usize>,
    max_recursion_depth: usize,
    /// Fewest hops each reached object was entered with
    visited: BTreeMap<ObjectId, usize>,
    dangling: BTreeSet<ObjectId>,
    overflow: Vec<(ObjectId, usize)>,
    deferred: usize,
}

impl<'a> ClosureWalker<'a> {
    pub fn new(
        entries: &'a BTreeMap<ObjectId, IndirectReference>,
        max_hops: Option<usize>,
        max_recursion_depth: usize,
    ) -> Self {
        Self {
            entries,
            max_hops,
            max_recursion_depth: max_recursion_depth.max(1),
            visited: BTreeMap::new(),
            dangling: BTreeSet::new(),
            overflow: Vec::new(),
            deferred: 0,
        }
    }

    /// Walks everything reachable from `roots`, which are the edges leaving
    /// the root object (hop 1).
    pub fn run(mut self, roots: Vec<ObjectId>) -> ClosureWalk {
        if self.max_hops != Some(0) {
            for root in roots {
                self.enter(root, 1, 0);
            }
        }

        while let Some((id, hops)) = self.overflow.pop() {
            // A shorter path found meanwhile has already covered this one
            if self.visited.get(&id).is_some_and(|best| *best < hops) {
                continue;
            }
            self.descend(id, hops, 0);
        }

        ClosureWalk {
            reachable: self.visited.into_keys().collect(),
            dangling: self.dangling,
            deferred: self.deferred,
        }
    }

    fn enter(&mut self, id: ObjectId, hops: usize, recursion: usize) {
        if !self.entries.contains_key(&id) {
            self.dangling.insert(id);
            return;
        }
        let improved = match self.visited.get(&id) {
            None => true,
            Some(best) => self.max_hops.is_some() && hops < *best,
        };
        if improved {
            self.visited.insert(id, hops);
            self.descend(id, hops, recursion);
        }
    }

    fn descend(&mut self, id: ObjectId, hops: usize, recursion: usize) {
        if self.max_hops.is_some_and(|max| hops >= max) {
            return;
        }
        if recursion >= self.max_recursion_depth {
            self.overflow.push((id, hops));
            self.deferred += 1;
            return;
        }

        let entries = self.entries;
        let Some(value) = entries.get(&id).and_then(IndirectReference::value) else {
            return;
        };

        let mut children = Vec::new();
        value.for_each_reference(|child| children.push(child));
        for child in children {
            self.enter(child, hops + 1, recursion + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Dictionary, Object};

    fn table(objects: Vec<(u32, Object)>) -> BTreeMap<ObjectId, IndirectReference> {
        objects
            .into_iter()
            .map(|(number, object)| {
                let id = ObjectId::new(number, 0);
                (id, IndirectReference::from_object(object, id, None).unwrap())
            })
            .collect()
    }

    fn link(to: u32) -> Object {
        let mut dict = Dictionary::new();
        dict.set("Next", ObjectId::new(to, 0));
        Object::Dictionary(dict)
    }

    #[test]
    fn test_cycle_is_visited_once() {
        let entries = table(vec![(1, link(2)), (2, link(3)), (3, link(1))]);
        let walk = ClosureWalker::new(&entries, None, MAX_RECURSION_DEPTH)
            .run(vec![ObjectId::new(1, 0)]);

        assert_eq!(walk.reachable.len(), 3);
        assert!(walk.dangling.is_empty());
        assert_eq!(walk.deferred, 0);
    }

    #[test]
    fn test_hop_limit() {
        let entries = table(vec![(1, link(2)), (2, link(3)), (3, Object::Null)]);

        let walk =
            ClosureWalker::new(&entries, Some(2), MAX_RECURSION_DEPTH).run(vec![ObjectId::new(1, 0)]);
        let numbers: Vec<_> = walk.reachable.iter().map(|id| id.number()).collect();
        assert_eq!(numbers, vec![1, 2]);

        let walk =
            ClosureWalker::new(&entries, Some(0), MAX_RECURSION_DEPTH).run(vec![ObjectId::new(1, 0)]);
        assert!(walk.reachable.is_empty());
    }

    #[test]
    fn test_hop_limit_uses_shortest_path() {
        // The root reaches 2 directly and through 1; the longer path is walked first
        let entries = table(vec![(1, link(2)), (2, link(3)), (3, Object::Null)]);
        let roots = vec![ObjectId::new(1, 0), ObjectId::new(2, 0)];

        let walk = ClosureWalker::new(&entries, Some(2), MAX_RECURSION_DEPTH).run(roots.clone());
        let numbers: Vec<_> = walk.reachable.iter().map(|id| id.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let walk = ClosureWalker::new(&entries, Some(1), MAX_RECURSION_DEPTH).run(roots);
        let numbers: Vec<_> = walk.reachable.iter().map(|id| id.number()).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_small_recursion_cap_defers_and_completes() {
        let objects = (1..=50).map(|n| (n, link(n + 1))).collect();
        let entries = table(objects);

        let walk = ClosureWalker::new(&entries, None, 4).run(vec![ObjectId::new(1, 0)]);

        assert_eq!(walk.reachable.len(), 50);
        assert!(walk.deferred > 0);
        assert_eq!(walk.dangling.len(), 1);
        assert!(walk.dangling.contains(&ObjectId::new(51, 0)));
    }
}
