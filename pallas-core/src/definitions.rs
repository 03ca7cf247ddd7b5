//! Definition tables: strings, regions, groups, comms, location groups and locations.
//!
//! `Archive` owns a per-process [`DefinitionTables`]; `GlobalArchive` owns the global
//! [`GlobalDefinitionTables`], which additionally tracks the location-group/location tree
//! (spec.md §3).

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

macro_rules! def_ref {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Sentinel referring to no entry (e.g. a comm-less event, or the parent of a
            /// tree root).
            pub const NONE: $name = $name(u32::MAX);

            pub const fn new(id: u32) -> Self {
                $name(id)
            }

            pub const fn is_none(self) -> bool {
                self.0 == u32::MAX
            }

            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

def_ref!(StringRef);
def_ref!(RegionRef);
def_ref!(GroupRef);
def_ref!(CommRef);
def_ref!(LocationGroupRef);
def_ref!(LocationRef);

/// Append-only, deduplicating string table.
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    strings: Vec<String>,
    index: FxHashMap<String, StringRef>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> StringRef {
        if let Some(&r) = self.index.get(s) {
            return r;
        }
        let r = StringRef::new(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), r);
        r
    }

    pub fn get(&self, r: StringRef) -> Option<&str> {
        if r.is_none() {
            return None;
        }
        self.strings.get(r.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn from_vec(strings: Vec<String>) -> Self {
        let index = strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), StringRef::new(i as u32)))
            .collect();
        Self { strings, index }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.strings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDef {
    pub name: StringRef,
    /// Source file the region was declared in, or `StringRef::NONE` when unknown. Filling
    /// this in is optional (SPEC_FULL.md §3); the reader never special-cases its absence.
    pub source_file: StringRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDef {
    pub name: StringRef,
    /// Member location/rank ids. Most communicators are small (a handful of ranks), so this
    /// stays inline rather than heap-allocating for the common case.
    pub members: SmallVec<[u32; 8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommDef {
    pub name: StringRef,
    pub group: GroupRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationGroupDef {
    pub name: StringRef,
    pub parent: LocationGroupRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationDef {
    pub name: StringRef,
    pub parent: LocationGroupRef,
}

/// Generic append-only table indexed by its own ref type.
#[derive(Debug, Clone)]
pub struct Table<R, T> {
    entries: Vec<T>,
    _marker: std::marker::PhantomData<R>,
}

impl<R, T> Default for Table<R, T> {
    fn default() -> Self {
        Self { entries: Vec::new(), _marker: std::marker::PhantomData }
    }
}

impl<T> Table<RegionRef, T> {
    pub fn push(&mut self, entry: T) -> RegionRef {
        let r = RegionRef::new(self.entries.len() as u32);
        self.entries.push(entry);
        r
    }
}

impl<T> Table<GroupRef, T> {
    pub fn push(&mut self, entry: T) -> GroupRef {
        let r = GroupRef::new(self.entries.len() as u32);
        self.entries.push(entry);
        r
    }
}

impl<T> Table<CommRef, T> {
    pub fn push(&mut self, entry: T) -> CommRef {
        let r = CommRef::new(self.entries.len() as u32);
        self.entries.push(entry);
        r
    }
}

impl<T> Table<LocationGroupRef, T> {
    pub fn push(&mut self, entry: T) -> LocationGroupRef {
        let r = LocationGroupRef::new(self.entries.len() as u32);
        self.entries.push(entry);
        r
    }
}

impl<T> Table<LocationRef, T> {
    pub fn push(&mut self, entry: T) -> LocationRef {
        let r = LocationRef::new(self.entries.len() as u32);
        self.entries.push(entry);
        r
    }
}

impl<R, T> Table<R, T> {
    pub fn get(&self, idx: u32) -> Option<&T> {
        self.entries.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn from_vec(entries: Vec<T>) -> Self {
        Self { entries, _marker: std::marker::PhantomData }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }
}

/// Per-archive (per-process) definition tables.
#[derive(Debug, Default, Clone)]
pub struct DefinitionTables {
    pub strings: StringTable,
    pub regions: Table<RegionRef, RegionDef>,
    pub groups: Table<GroupRef, GroupDef>,
    pub comms: Table<CommRef, CommDef>,
}

impl DefinitionTables {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Global definition tables, additionally tracking the location-group/location tree
/// (spec.md §3: "form a tree rooted at an invalid-sentinel parent").
#[derive(Debug, Default, Clone)]
pub struct GlobalDefinitionTables {
    pub base: DefinitionTables,
    pub location_groups: Table<LocationGroupRef, LocationGroupDef>,
    pub locations: Table<LocationRef, LocationDef>,
}

impl GlobalDefinitionTables {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_interning_deduplicates() {
        let mut table = StringTable::new();
        let a = table.intern("main");
        let b = table.intern("main");
        let c = table.intern("loop_body");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.get(a), Some("main"));
    }

    #[test]
    fn location_tree_roots_at_none_sentinel() {
        let mut tables = GlobalDefinitionTables::new();
        let root = tables.location_groups.push(LocationGroupDef {
            name: StringRef::new(0),
            parent: LocationGroupRef::NONE,
        });
        assert!(tables.location_groups.get(root.0).unwrap().parent.is_none());
    }
}
