//! The in-memory cross-reference table.
//!
//! [`XRefTable`] is the single owner of every indirect object of a document.
//! It maps [`ObjectId`]s to [`IndirectReference`]s, hands out fresh object
//! numbers, and implements the whole-graph operations that run before a
//! save: reachability ([`XRefTable::transitive_closure`]), garbage collection
//! ([`XRefTable::compact`]) and dense renumbering ([`XRefTable::renumber`]).

mod closure;
mod reference;

pub use closure::MAX_RECURSION_DEPTH;
pub use reference::{DocumentId, IndirectReference};

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use closure::ClosureWalker;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Key of the counter stored in the dead-object placeholder.
pub const DEAD_OBJECT_COUNT_KEY: &str = "DeadObjectCount";

/// Largest object number a table accepts (the PDF implementation limit).
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

#[derive(Debug, Clone)]
pub struct XRefTable {
    document: DocumentId,
    entries: BTreeMap<ObjectId, IndirectReference>,
    max_object_number: u32,
    under_construction: bool,
    max_recursion_depth: usize,
    dead_object: Option<ObjectId>,
    dead_object_count: u32,
}

impl XRefTable {
    pub fn new(document: DocumentId) -> Self {
        Self {
            document,
            entries: BTreeMap::new(),
            max_object_number: 0,
            under_construction: false,
            max_recursion_depth: MAX_RECURSION_DEPTH,
            dead_object: None,
            dead_object_count: 0,
        }
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth.max(1);
        self
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_object_number(&self) -> u32 {
        self.max_object_number
    }

    /// True while a file is being parsed into this table.
    pub fn is_under_construction(&self) -> bool {
        self.under_construction
    }

    pub(crate) fn set_under_construction(&mut self, value: bool) {
        self.under_construction = value;
    }

    /// Hands out the next object number. Numbers are never reused by
    /// [`XRefTable::remove`]; only [`XRefTable::compact`] and
    /// [`XRefTable::renumber`] recount the counter.
    ///
    /// Fails once the counter has reached [`MAX_OBJECT_NUMBER`].
    pub fn new_object_number(&mut self) -> Result<u32> {
        let number = self
            .max_object_number
            .checked_add(1)
            .filter(|number| *number <= MAX_OBJECT_NUMBER)
            .ok_or_else(|| {
                PdfError::InvalidStructure(format!(
                    "object numbers exhausted (limit {MAX_OBJECT_NUMBER})"
                ))
            })?;
        self.max_object_number = number;
        Ok(number)
    }

    /// Registers a reference and returns its identifier.
    ///
    /// A reference with the empty identifier gets the next free number. When
    /// another reference is already registered under the same identifier the
    /// newer one replaces it: real files (incremental updates, sloppy
    /// writers) define the same object more than once and the latest
    /// definition wins. Numbers above [`MAX_OBJECT_NUMBER`] are refused.
    ///
    /// The table invariants are not re-checked here; bulk loaders call
    /// [`XRefTable::verify_consistency`] once they are done.
    pub fn add(&mut self, mut reference: IndirectReference) -> Result<ObjectId> {
        if reference.id().number() > MAX_OBJECT_NUMBER {
            return Err(PdfError::InvalidStructure(format!(
                "object number {} exceeds the limit {MAX_OBJECT_NUMBER}",
                reference.id().number()
            )));
        }
        reference.attach(self.document)?;

        if reference.id().is_empty() {
            let number = self.new_object_number()?;
            reference.set_id(ObjectId::new(number, 0));
        }

        let id = reference.id();
        self.max_object_number = self.max_object_number.max(id.number());

        if let Some(previous) = self.entries.insert(id, reference) {
            warn!(
                object = %id,
                previous_position = ?previous.position(),
                "duplicate object identifier, keeping the last registered definition"
            );
        }
        Ok(id)
    }

    /// Makes a bare object indirect under a freshly allocated number.
    ///
    /// Passing an object that is already a reference edge is a programming
    /// error and fails with `InvalidOperation`.
    pub fn add_object(&mut self, object: Object) -> Result<ObjectId> {
        if let Object::Reference(id) = object {
            return Err(PdfError::invalid_operation(format!(
                "object {id} is already indirect"
            )));
        }
        let number = self.new_object_number()?;
        let id = ObjectId::new(number, 0);
        self.add(IndirectReference::from_object(object, id, None)?)
    }

    /// Registers a new dictionary under a fresh number. Only fails when
    /// object numbers are exhausted.
    pub fn add_dictionary(&mut self, dict: Dictionary) -> Result<ObjectId> {
        let id = ObjectId::new(self.new_object_number()?, 0);
        self.insert_dictionary(id, dict);
        Ok(id)
    }

    /// Registers `dict` under a caller-chosen identifier, for bootstrapping
    /// a fresh table.
    pub(crate) fn insert_dictionary(&mut self, id: ObjectId, dict: Dictionary) {
        self.max_object_number = self.max_object_number.max(id.number());
        self.entries
            .insert(id, IndirectReference::owned_dictionary(dict, id, self.document));
    }

    /// Idempotent variant of [`XRefTable::add_object`].
    ///
    /// Returns the identifier of the indirect object and whether anything
    /// was inserted. A reference edge is returned unchanged with `false`.
    pub fn try_add_object(&mut self, object: Object) -> Result<(ObjectId, bool)> {
        match object {
            Object::Reference(id) => {
                if !self.entries.contains_key(&id) {
                    warn!(object = %id, "try_add_object called with a dangling reference edge");
                }
                Ok((id, false))
            }
            object => Ok((self.add_object(object)?, true)),
        }
    }

    /// Removes the entry for `id`. Edges that still point at it are left
    /// untouched and become dangling.
    pub fn remove(&mut self, id: ObjectId) -> Option<IndirectReference> {
        let removed = self.entries.remove(&id);
        if self.dead_object == Some(id) {
            self.dead_object = None;
        }
        removed
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Lookup. Absence is an ordinary outcome (dangling edge), not an error.
    pub fn get(&self, id: ObjectId) -> Option<&IndirectReference> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut IndirectReference> {
        self.entries.get_mut(&id)
    }

    /// Bound object for `id`; `None` for unknown ids and unbound placeholders.
    pub fn get_object(&self, id: ObjectId) -> Option<&Object> {
        self.entries.get(&id).and_then(IndirectReference::value)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.entries
            .get_mut(&id)
            .and_then(IndirectReference::value_mut)
    }

    /// Like [`XRefTable::get_object`], but distinguishes why nothing came back.
    ///
    /// Resolving a placeholder while the table is still being loaded is
    /// refused instead of silently yielding nothing.
    pub fn resolve(&self, id: ObjectId) -> Result<&Object> {
        let reference = self
            .entries
            .get(&id)
            .ok_or(PdfError::InvalidReference(id))?;
        match reference.value() {
            Some(value) => Ok(value),
            None if self.under_construction => Err(PdfError::invalid_operation(format!(
                "object {id} resolved before the document finished loading"
            ))),
            None => Err(PdfError::InvalidReference(id)),
        }
    }

    /// References in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &IndirectReference> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn set_position(&mut self, id: ObjectId, position: u64) {
        if let Some(reference) = self.entries.get_mut(&id) {
            reference.set_position(position);
        }
    }

    /// Offset of the object stored right after `id` in the file: the
    /// smallest recorded position that is at least `position` and is not the
    /// object's own. `None` when nothing follows.
    pub fn position_of_object_behind(&self, id: ObjectId, position: u64) -> Option<u64> {
        let own = self.entries.get(&id).and_then(IndirectReference::position);
        self.entries
            .values()
            .filter_map(IndirectReference::position)
            .filter(|candidate| *candidate >= position && Some(*candidate) != own)
            .min()
    }

    /// Number of dangling identifiers redirected to the dead object so far.
    pub fn dead_object_count(&self) -> u32 {
        self.dead_object_count
    }

    pub fn dead_object_id(&self) -> Option<ObjectId> {
        self.dead_object
    }

    /// Returns the dead-object placeholder, creating it on first use, and
    /// bumps its counter.
    ///
    /// The placeholder is an ordinary dictionary `<< /DeadObjectCount n >>`
    /// registered in this table; edges that cannot be resolved are
    /// redirected to it so that every edge written out resolves.
    ///
    /// It is numbered above the counter, skipping numbers that any edge in
    /// the table already targets, so a dangling edge held by an object the
    /// closure did not reach never starts pointing at it.
    pub fn dead_object(&mut self) -> Result<ObjectId> {
        let id = match self.dead_object.filter(|id| self.entries.contains_key(id)) {
            Some(id) => id,
            None => {
                let id = ObjectId::new(self.free_untargeted_number()?, 0);
                let placeholder =
                    IndirectReference::from_object(Object::Dictionary(Dictionary::new()), id, None)?;
                self.add(placeholder)?;
                self.dead_object = Some(id);
                id
            }
        };

        self.dead_object_count += 1;
        let count = self.dead_object_count;
        if let Some(dict) = self.get_object_mut(id).and_then(Object::as_dict_mut) {
            dict.set(DEAD_OBJECT_COUNT_KEY, count);
        }
        Ok(id)
    }

    fn free_untargeted_number(&self) -> Result<u32> {
        let mut targeted = BTreeSet::new();
        for value in self.entries.values().filter_map(IndirectReference::value) {
            value.for_each_reference(|edge| {
                targeted.insert(edge.number());
            });
        }

        let mut candidate = self.max_object_number;
        loop {
            candidate = candidate
                .checked_add(1)
                .filter(|number| *number <= MAX_OBJECT_NUMBER)
                .ok_or_else(|| {
                    PdfError::InvalidStructure(format!(
                        "no object number left for the dead object (limit {MAX_OBJECT_NUMBER})"
                    ))
                })?;
            if !targeted.contains(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Every indirect object reachable from `root` by following reference
    /// edges through dictionaries, arrays and stream dictionaries.
    ///
    /// `depth` limits the number of edges followed (`None` is unbounded). The
    /// root itself is not part of the result unless an edge leads back to it.
    /// Edges to identifiers missing from the table are redirected to the
    /// dead object, both inside the reachable objects and inside `root`.
    pub fn transitive_closure(
        &mut self,
        root: &mut Object,
        depth: Option<usize>,
    ) -> Result<BTreeSet<ObjectId>> {
        let mut roots = Vec::new();
        root.for_each_reference(|id| roots.push(id));

        let walk = ClosureWalker::new(&self.entries, depth, self.max_recursion_depth).run(roots);
        if walk.deferred > 0 {
            debug!(
                deferred = walk.deferred,
                "closure walk used the overflow worklist"
            );
        }

        let mut reachable = walk.reachable;
        if !walk.dangling.is_empty() {
            let dead = self.redirect_dangling(&walk.dangling, &reachable)?;
            root.for_each_reference_mut(|edge| {
                if walk.dangling.contains(edge) {
                    *edge = dead;
                }
            });
            reachable.insert(dead);
        }
        Ok(reachable)
    }

    /// [`XRefTable::transitive_closure`] rooted at a dictionary, typically the
    /// trailer.
    pub fn transitive_closure_of_dictionary(
        &mut self,
        root: &mut Dictionary,
        depth: Option<usize>,
    ) -> Result<BTreeSet<ObjectId>> {
        let mut object = Object::Dictionary(std::mem::take(root));
        let result = self.transitive_closure(&mut object, depth);
        if let Object::Dictionary(dict) = object {
            *root = dict;
        }
        result
    }

    /// Closure rooted at the indirect object `id`, which is included.
    pub fn transitive_closure_of(
        &mut self,
        id: ObjectId,
        depth: Option<usize>,
    ) -> Result<BTreeSet<ObjectId>> {
        if !self.entries.contains_key(&id) {
            return Ok(BTreeSet::new());
        }
        let mut root = Object::Array(vec![Object::Reference(id)]);
        self.transitive_closure(&mut root, depth.map(|d| d + 1))
    }

    fn redirect_dangling(
        &mut self,
        dangling: &BTreeSet<ObjectId>,
        reachable: &BTreeSet<ObjectId>,
    ) -> Result<ObjectId> {
        let mut dead = ObjectId::EMPTY;
        for id in dangling {
            warn!(object = %id, "reference to a missing object, substituting the dead object");
            dead = self.dead_object()?;
        }

        for id in reachable {
            if let Some(value) = self.get_object_mut(*id) {
                value.for_each_reference_mut(|edge| {
                    if dangling.contains(edge) {
                        *edge = dead;
                    }
                });
            }
        }
        Ok(dead)
    }

    /// Drops every object that is not reachable from `trailer` and recounts
    /// the object-number counter. Returns how many entries were dropped.
    pub fn compact(&mut self, trailer: &mut Dictionary) -> Result<usize> {
        self.ensure_complete("compact")?;

        let reachable = self.transitive_closure_of_dictionary(trailer, None)?;
        let before = self.entries.len();
        self.entries.retain(|id, _| reachable.contains(id));
        if self.dead_object.is_some_and(|id| !self.entries.contains_key(&id)) {
            self.dead_object = None;
        }
        self.max_object_number = self.entries.keys().map(ObjectId::number).max().unwrap_or(0);

        let removed = before - self.entries.len();
        debug!(removed, remaining = self.entries.len(), "compacted cross-reference table");
        debug_assert!(
            self.verify_consistency().is_ok(),
            "cross-reference table inconsistent after compact"
        );
        Ok(removed)
    }

    /// Reassigns identifiers `(1, 0)..(N, 0)` in ascending order of the old
    /// identifiers and rewrites every edge, in the table and in `trailer`.
    ///
    /// Returns the old → new mapping. Running it twice is a no-op the second
    /// time.
    pub fn renumber(&mut self, trailer: &mut Dictionary) -> Result<BTreeMap<ObjectId, ObjectId>> {
        self.ensure_complete("renumber")?;
        if self.entries.len() > MAX_OBJECT_NUMBER as usize {
            return Err(PdfError::InvalidStructure(format!(
                "{} objects cannot be numbered densely (limit {MAX_OBJECT_NUMBER})",
                self.entries.len()
            )));
        }

        let mapping: BTreeMap<ObjectId, ObjectId> = self
            .entries
            .keys()
            .enumerate()
            .map(|(index, old)| (*old, ObjectId::new(index as u32 + 1, 0)))
            .collect();

        let remap = |edge: &mut ObjectId| match mapping.get(edge) {
            Some(new) => *edge = *new,
            None => warn!(object = %edge, "renumbering left a dangling reference untouched"),
        };

        let old_entries = std::mem::take(&mut self.entries);
        for (old, mut reference) in old_entries {
            let new = mapping.get(&old).copied().unwrap_or(old);
            reference.set_id(new);
            if let Some(value) = reference.value_mut() {
                value.for_each_reference_mut(remap);
            }
            self.entries.insert(new, reference);
        }

        for value in trailer.values_mut() {
            value.for_each_reference_mut(remap);
        }

        self.dead_object = self.dead_object.and_then(|id| mapping.get(&id).copied());
        self.max_object_number = self.entries.len() as u32;

        debug_assert!(
            self.verify_consistency().is_ok(),
            "cross-reference table inconsistent after renumber"
        );
        Ok(mapping)
    }

    fn ensure_complete(&self, operation: &str) -> Result<()> {
        if self.under_construction {
            return Err(PdfError::invalid_operation(format!(
                "cannot {operation} while the document is still loading"
            )));
        }
        Ok(())
    }

    /// Checks the table invariants: keys match their references, every
    /// reference belongs to this table's document, the counter covers every
    /// number, and (once loading is over) every reference is bound.
    pub fn verify_consistency(&self) -> Result<()> {
        for (key, reference) in &self.entries {
            if *key != reference.id() {
                return Err(PdfError::InvalidStructure(format!(
                    "table key {key} holds reference {}",
                    reference.id()
                )));
            }
            if reference.document() != Some(self.document) {
                return Err(PdfError::InvalidStructure(format!(
                    "reference {key} is not owned by document {}",
                    self.document
                )));
            }
            if key.number() > self.max_object_number {
                return Err(PdfError::InvalidStructure(format!(
                    "object number {} exceeds the counter {}",
                    key.number(),
                    self.max_object_number
                )));
            }
            match reference.value() {
                Some(Object::Reference(target)) => {
                    return Err(PdfError::InvalidStructure(format!(
                        "reference {key} is bound to the edge {target}"
                    )));
                }
                None if !self.under_construction => {
                    return Err(PdfError::InvalidStructure(format!(
                        "reference {key} is unbound"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_table() -> XRefTable {
        XRefTable::new(DocumentId::new())
    }

    fn dict_with(key: &str, target: ObjectId) -> Object {
        let mut dict = Dictionary::new();
        dict.set(key, target);
        Object::Dictionary(dict)
    }

    #[test]
    fn test_add_object_assigns_increasing_numbers() {
        let mut table = new_table();
        let a = table.add_object(Object::Integer(1)).unwrap();
        let b = table.add_object(Object::Integer(2)).unwrap();

        assert_eq!(a, ObjectId::new(1, 0));
        assert_eq!(b, ObjectId::new(2, 0));
        assert_eq!(table.max_object_number(), 2);
        assert_eq!(table.get_object(b), Some(&Object::Integer(2)));
    }

    #[test]
    fn test_add_empty_identifier_gets_next_number() {
        let mut table = new_table();
        table.add_object(Object::Null).unwrap();
        let reference =
            IndirectReference::from_object(Object::Boolean(true), ObjectId::EMPTY, None).unwrap();

        let id = table.add(reference).unwrap();
        assert_eq!(id, ObjectId::new(2, 0));
        assert_eq!(table.get(id).unwrap().id(), id);
    }

    #[test]
    fn test_duplicate_identifier_last_wins() {
        let mut table = new_table();
        let id = ObjectId::new(4, 0);
        table
            .add(IndirectReference::from_object(Object::Integer(1), id, Some(10)).unwrap())
            .unwrap();
        table
            .add(IndirectReference::from_object(Object::Integer(2), id, Some(90)).unwrap())
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get_object(id), Some(&Object::Integer(2)));
        assert_eq!(table.get(id).unwrap().position(), Some(90));
        assert_eq!(table.max_object_number(), 4);
    }

    #[test]
    fn test_add_object_rejects_reference_edge() {
        let mut table = new_table();
        let id = table.add_object(Object::Null).unwrap();

        let result = table.add_object(Object::Reference(id));
        assert!(matches!(result, Err(PdfError::InvalidOperation(_))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_try_add_object_is_idempotent() {
        let mut table = new_table();
        let (id, inserted) = table.try_add_object(Object::Integer(5)).unwrap();
        assert!(inserted);

        let (again, inserted) = table.try_add_object(Object::Reference(id)).unwrap();
        assert!(!inserted);
        assert_eq!(again, id);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reference_from_other_document_is_rejected() {
        let mut first = new_table();
        let mut second = new_table();
        let id = first.add_object(Object::Integer(1)).unwrap();
        let stolen = first.remove(id).unwrap();

        assert!(matches!(
            second.add(stolen),
            Err(PdfError::InvalidOperation(_))
        ));
        assert!(second.is_empty());
    }

    #[test]
    fn test_remove_does_not_reuse_numbers() {
        let mut table = new_table();
        let a = table.add_object(Object::Null).unwrap();
        table.add_object(Object::Null).unwrap();
        let removed = table.remove(a).unwrap();
        assert_eq!(removed.id(), a);

        let c = table.add_object(Object::Null).unwrap();
        assert_eq!(c.number(), 3);
        assert!(table.get(a).is_none());
        assert!(table.get_object(a).is_none());
    }

    #[test]
    fn test_object_number_limit() {
        let mut table = new_table();

        let oversized = IndirectReference::for_object_id(ObjectId::new(u32::MAX, 0), 10);
        assert!(matches!(
            table.add(oversized),
            Err(PdfError::InvalidStructure(_))
        ));
        assert!(table.is_empty());
        assert_eq!(table.max_object_number(), 0);

        let last = IndirectReference::from_object(
            Object::Integer(1),
            ObjectId::new(MAX_OBJECT_NUMBER, 0),
            None,
        )
        .unwrap();
        table.add(last).unwrap();
        table.add_object(Object::Integer(2)).unwrap_err();
        assert!(table.new_object_number().is_err());
        assert_eq!(table.len(), 1);
        assert_eq!(table.max_object_number(), MAX_OBJECT_NUMBER);
    }

    #[test]
    fn test_resolve_guards_loading_placeholders() {
        let mut table = new_table();
        table.set_under_construction(true);
        let id = table
            .add(IndirectReference::for_object_id(ObjectId::new(3, 0), 42))
            .unwrap();

        assert!(matches!(
            table.resolve(id),
            Err(PdfError::InvalidOperation(_))
        ));
        assert!(matches!(
            table.resolve(ObjectId::new(8, 0)),
            Err(PdfError::InvalidReference(_))
        ));

        table.get_mut(id).unwrap().bind(Object::Integer(3)).unwrap();
        table.set_under_construction(false);
        assert_eq!(table.resolve(id).unwrap(), &Object::Integer(3));
    }

    #[test]
    fn test_position_of_object_behind() {
        let mut table = new_table();
        table.set_under_construction(true);
        for (number, position) in [(1, 15), (2, 300), (3, 120), (4, 120)] {
            table
                .add(IndirectReference::for_object_id(
                    ObjectId::new(number, 0),
                    position,
                ))
                .unwrap();
        }

        assert_eq!(
            table.position_of_object_behind(ObjectId::new(1, 0), 15),
            Some(120)
        );
        assert_eq!(
            table.position_of_object_behind(ObjectId::new(3, 0), 120),
            Some(300)
        );
        assert_eq!(
            table.position_of_object_behind(ObjectId::new(2, 0), 300),
            None
        );
    }

    #[test]
    fn test_closure_follows_edges_and_cycles() {
        let mut table = new_table();
        let page = table.add_object(Object::Null).unwrap();
        let pages = table.add_object(dict_with("Kids", page)).unwrap();
        table
            .get_mut(page)
            .unwrap()
            .replace_value(dict_with("Parent", pages))
            .unwrap();
        let orphan = table.add_object(Object::Integer(9)).unwrap();

        let mut root = dict_with("Pages", pages);
        let reachable = table.transitive_closure(&mut root, None).unwrap();

        assert_eq!(reachable, BTreeSet::from([page, pages]));
        assert!(!reachable.contains(&orphan));
    }

    #[test]
    fn test_closure_of_object_includes_itself() {
        let mut table = new_table();
        let leaf = table.add_object(Object::Integer(1)).unwrap();
        let node = table.add_object(dict_with("Leaf", leaf)).unwrap();

        let reachable = table.transitive_closure_of(node, None).unwrap();
        assert_eq!(reachable, BTreeSet::from([leaf, node]));

        let shallow = table.transitive_closure_of(node, Some(0)).unwrap();
        assert_eq!(shallow, BTreeSet::from([node]));
    }

    #[test]
    fn test_dangling_edge_becomes_dead_object() {
        let mut table = new_table();
        let missing = ObjectId::new(999, 0);
        let holder = table.add_object(dict_with("Lost", missing)).unwrap();

        let mut root = dict_with("Holder", holder);
        let reachable = table.transitive_closure(&mut root, None).unwrap();

        assert_eq!(table.dead_object_count(), 1);
        let dead = table.dead_object_id().unwrap();
        assert!(reachable.contains(&dead));

        let holder_dict = table.get_object(holder).and_then(Object::as_dict).unwrap();
        assert_eq!(holder_dict.get_reference("Lost"), Some(dead));

        let dead_dict = table.get_object(dead).and_then(Object::as_dict).unwrap();
        assert_eq!(dead_dict.get_integer(DEAD_OBJECT_COUNT_KEY), Some(1));
    }

    #[test]
    fn test_compact_drops_unreachable() {
        let mut table = new_table();
        let catalog = table.add_object(Object::Null).unwrap();
        table.add_object(Object::Integer(1)).unwrap();
        let kept = table.add_object(Object::Integer(2)).unwrap();
        table
            .get_mut(catalog)
            .unwrap()
            .replace_value(dict_with("Kept", kept))
            .unwrap();
        table.add_object(Object::Integer(3)).unwrap();

        let mut trailer = Dictionary::new();
        trailer.set("Root", catalog);

        let removed = table.compact(&mut trailer).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(table.ids(), vec![catalog, kept]);
        assert_eq!(table.max_object_number(), 3);
    }

    #[test]
    fn test_renumber_is_dense_and_idempotent() {
        let mut table = new_table();
        table.set_under_construction(true);
        for number in [4u32, 9, 17] {
            let id = ObjectId::new(number, 0);
            let next = ObjectId::new(if number == 17 { 4 } else { number + 5 }, 0);
            let mut reference = IndirectReference::for_object_id(id, number as u64);
            reference.bind(dict_with("Next", next)).unwrap();
            table.add(reference).unwrap();
        }
        table.set_under_construction(false);

        let mut trailer = Dictionary::new();
        trailer.set("Root", ObjectId::new(9, 0));

        let mapping = table.renumber(&mut trailer).unwrap();
        assert_eq!(mapping[&ObjectId::new(17, 0)], ObjectId::new(3, 0));
        assert_eq!(
            table.ids(),
            vec![
                ObjectId::new(1, 0),
                ObjectId::new(2, 0),
                ObjectId::new(3, 0)
            ]
        );
        assert_eq!(trailer.get_reference("Root"), Some(ObjectId::new(2, 0)));
        let third = table.get_object(ObjectId::new(3, 0)).unwrap();
        assert_eq!(
            third.as_dict().unwrap().get_reference("Next"),
            Some(ObjectId::new(1, 0))
        );
        assert_eq!(table.max_object_number(), 3);

        let before: Vec<_> = table.iter().map(|r| (r.id(), r.value().cloned())).collect();
        let second = table.renumber(&mut trailer).unwrap();
        assert!(second.iter().all(|(old, new)| old == new));
        let after: Vec<_> = table.iter().map(|r| (r.id(), r.value().cloned())).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_whole_graph_operations_refused_while_loading() {
        let mut table = new_table();
        table.set_under_construction(true);
        let mut trailer = Dictionary::new();
        assert!(table.compact(&mut trailer).is_err());
        assert!(table.renumber(&mut trailer).is_err());
    }

    #[test]
    fn test_verify_consistency_detects_unbound_after_loading() {
        let mut table = new_table();
        table.set_under_construction(true);
        table
            .add(IndirectReference::for_object_id(ObjectId::new(1, 0), 0))
            .unwrap();
        assert!(table.verify_consistency().is_ok());

        table.set_under_construction(false);
        assert!(table.verify_consistency().is_err());
    }
}
