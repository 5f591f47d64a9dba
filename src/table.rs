use alloc::vec::Vec;

use crate::{
    content::CompleteName,
    interest::Interest,
    name::{Name, NameComponent},
};

// The table is a trie keyed by name component. Every node stands for the name
//  spelled by the path from the root and holds the entries registered under
//  exactly that name, in insertion order.
// Every name that is a prefix of a query lies on the query's path from the
//  root, so prefix lookups only walk one branch, deepest node = longest match.
// Nodes left without entries or children are pruned on removal.

/// A registered name or interest together with the caller's value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry<V> {
    Name { name: Name, value: V },
    Interest { interest: Interest, value: V },
}

impl<V> Entry<V> {
    pub fn name(&self) -> &Name {
        match self {
            Entry::Name { name, .. } => name,
            Entry::Interest { interest, .. } => interest.name(),
        }
    }

    pub fn interest(&self) -> Option<&Interest> {
        match self {
            Entry::Name { .. } => None,
            Entry::Interest { interest, .. } => Some(interest),
        }
    }

    pub fn value(&self) -> &V {
        match self {
            Entry::Name { value, .. } => value,
            Entry::Interest { value, .. } => value,
        }
    }

    fn matches(&self, target: &CompleteName<'_>) -> bool {
        self.interest().is_some_and(|i| i.matches(target))
    }
}

/// A multimap from names to entries with prefix-based matching.
///
/// Duplicate entries are fully supported, so `len` may be much larger than
/// `len_names`. Matching operations consider interest entries only, bare name
/// entries are returned by `get_name_matches` alone.
pub struct InterestTable<V> {
    root: TableNode<V>,
    len: usize,
    len_names: usize,
}

impl<V> Default for InterestTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InterestTable<V> {
    pub fn new() -> Self {
        Self {
            root: TableNode::new(),
            len: 0,
            len_names: 0,
        }
    }

    pub fn add_name(&mut self, name: Name, value: V) {
        self.add(Entry::Name { name, value })
    }

    pub fn add_interest(&mut self, interest: Interest, value: V) {
        self.add(Entry::Interest { interest, value })
    }

    fn add(&mut self, entry: Entry<V>) {
        let mut node = &mut self.root;
        for component in entry.name().components() {
            node = node.get_or_insert_child(component);
        }
        if node.entries.is_empty() {
            self.len_names += 1;
        }
        node.entries.push(entry);
        self.len += 1;
    }

    /// The interest entry with the longest name that matches `target`.
    pub fn get_match<'t>(&self, target: impl Into<CompleteName<'t>>) -> Option<&Entry<V>> {
        let target = target.into();
        let digest = target.digest.map(|d| d.to_component());
        self.nodes_on_path(target.name, digest.as_ref())
            .into_iter()
            .rev()
            .find_map(|node| node.entries.iter().find(|e| e.matches(&target)))
    }

    /// Every interest entry matching `target`, shorter names first.
    pub fn get_matches<'t>(&self, target: impl Into<CompleteName<'t>>) -> Vec<&Entry<V>> {
        let target = target.into();
        let digest = target.digest.map(|d| d.to_component());
        self.nodes_on_path(target.name, digest.as_ref())
            .into_iter()
            .flat_map(|node| node.entries.iter().filter(|e| e.matches(&target)))
            .collect()
    }

    /// Every entry, name or interest, registered under a prefix of `name`.
    pub fn get_name_matches(&self, name: &Name) -> Vec<&Entry<V>> {
        self.nodes_on_path(name, None)
            .into_iter()
            .flat_map(|node| node.entries.iter())
            .collect()
    }

    pub fn remove_match<'t>(&mut self, target: impl Into<CompleteName<'t>>) -> Option<Entry<V>> {
        let target = target.into();
        let digest = target.digest.map(|d| d.to_component());

        // Find the best match first, the trie is only changed once it is known
        let (depth, index) = self
            .nodes_on_path(target.name, digest.as_ref())
            .into_iter()
            .enumerate()
            .rev()
            .find_map(|(depth, node)| {
                let index = node.entries.iter().position(|e| e.matches(&target))?;
                Some((depth, index))
            })?;

        let path = target.name.components().chain(digest.as_ref()).take(depth);
        self.remove_at(path, |entries| {
            let mut removed = Vec::with_capacity(1);
            removed.push(entries.remove(index));
            removed
        })
        .pop()
    }

    pub fn remove_matches<'t>(&mut self, target: impl Into<CompleteName<'t>>) -> Vec<Entry<V>> {
        let target = target.into();
        let digest = target.digest.map(|d| d.to_component());

        let depths: Vec<usize> = self
            .nodes_on_path(target.name, digest.as_ref())
            .into_iter()
            .enumerate()
            .filter(|(_, node)| node.entries.iter().any(|e| e.matches(&target)))
            .map(|(depth, _)| depth)
            .collect();

        let mut removed = Vec::new();
        for depth in depths {
            let path = target.name.components().chain(digest.as_ref()).take(depth);
            removed.extend(self.remove_at(path, |entries| {
                let (matched, kept): (Vec<_>, Vec<_>) =
                    entries.drain(..).partition(|e| e.matches(&target));
                *entries = kept;
                matched
            }));
        }
        removed
    }

    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Entry<V>) -> bool,
    {
        let (removed, emptied) = self.root.retain(&mut keep);
        self.len -= removed;
        self.len_names -= emptied;
        removed
    }

    /// Removes everything, returning the number of entries dropped.
    pub fn clear(&mut self) -> usize {
        let len = self.len;
        *self = Self::new();
        len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn len_names(&self) -> usize {
        self.len_names
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn nodes_on_path<'a>(
        &self,
        name: &'a Name,
        digest: Option<&'a NameComponent>,
    ) -> Vec<&TableNode<V>> {
        let mut nodes = Vec::with_capacity(name.component_count() + 2);
        let mut node = &self.root;
        nodes.push(node);
        for component in name.components().chain(digest) {
            match node.get_child(component) {
                Some(child) => {
                    node = child;
                    nodes.push(node);
                }
                None => break,
            }
        }
        nodes
    }

    fn remove_at<'c, I, F>(&mut self, path: I, mut select: F) -> Vec<Entry<V>>
    where
        I: IntoIterator<Item = &'c NameComponent>,
        F: FnMut(&mut Vec<Entry<V>>) -> Vec<Entry<V>>,
    {
        let mut emptied = false;
        let removed = self
            .root
            .remove_entries(&mut path.into_iter(), &mut |entries| {
                let had_entries = !entries.is_empty();
                let removed = select(entries);
                emptied = had_entries && entries.is_empty();
                removed
            });
        self.len -= removed.len();
        if emptied {
            self.len_names -= 1;
        }
        removed
    }
}

impl<V: PartialEq> InterestTable<V> {
    /// Removes the first entry registered under exactly `name` whose value
    /// equals `value`.
    pub fn remove_name(&mut self, name: &Name, value: &V) -> Option<Entry<V>> {
        self.remove_at(name.components(), |entries| {
            match entries.iter().position(|e| e.value() == value) {
                Some(index) => alloc::vec![entries.remove(index)],
                None => Vec::new(),
            }
        })
        .pop()
    }

    /// Removes the first entry holding an equal interest and an equal value.
    pub fn remove_interest(&mut self, interest: &Interest, value: &V) -> Option<Entry<V>> {
        self.remove_at(interest.name().components(), |entries| {
            match entries
                .iter()
                .position(|e| e.interest() == Some(interest) && e.value() == value)
            {
                Some(index) => alloc::vec![entries.remove(index)],
                None => Vec::new(),
            }
        })
        .pop()
    }
}

struct TableNode<V> {
    entries: Vec<Entry<V>>,
    // Ordered by component
    children: Vec<(NameComponent, TableNode<V>)>,
}

impl<V> TableNode<V> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            children: Vec::new(),
        }
    }

    fn get_child(&self, component: &NameComponent) -> Option<&TableNode<V>> {
        match self.children.binary_search_by(|x| x.0.cmp(component)) {
            Ok(idx) => Some(&self.children[idx].1),
            Err(_) => None,
        }
    }

    fn get_child_mut(&mut self, component: &NameComponent) -> Option<(&mut TableNode<V>, usize)> {
        match self.children.binary_search_by(|x| x.0.cmp(component)) {
            Ok(idx) => Some((&mut self.children[idx].1, idx)),
            Err(_) => None,
        }
    }

    fn get_or_insert_child(&mut self, component: &NameComponent) -> &mut TableNode<V> {
        let idx = match self.children.binary_search_by(|x| x.0.cmp(component)) {
            Ok(idx) => idx,
            Err(idx) => {
                self.children.insert(idx, (component.clone(), TableNode::new()));
                idx
            }
        };
        &mut self.children[idx].1
    }

    fn remove_entries<'c, I, F>(&mut self, remaining_components: &mut I, select: &mut F) -> Vec<Entry<V>>
    where
        I: Iterator<Item = &'c NameComponent>,
        F: FnMut(&mut Vec<Entry<V>>) -> Vec<Entry<V>>,
    {
        match remaining_components.next() {
            Some(component) => {
                // There are more components, so the entries live further down
                let (child, idx) = match self.get_child_mut(component) {
                    Some(found) => found,
                    None => return Vec::new(),
                };
                let removed = child.remove_entries(remaining_components, select);
                if child.is_empty() {
                    self.children.remove(idx);
                }
                removed
            }
            None => select(&mut self.entries),
        }
    }

    // Returns the number of removed entries and of nodes that lost their last entry
    fn retain<F>(&mut self, keep: &mut F) -> (usize, usize)
    where
        F: FnMut(&Entry<V>) -> bool,
    {
        let mut removed = 0;
        let mut emptied = 0;
        for (_, child) in self.children.iter_mut() {
            let (r, e) = child.retain(keep);
            removed += r;
            emptied += e;
        }
        self.children.retain(|c| !c.1.is_empty());

        let before = self.entries.len();
        self.entries.retain(|e| keep(e));
        removed += before - self.entries.len();
        if before > 0 && self.entries.is_empty() {
            emptied += 1;
        }
        (removed, emptied)
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.children.is_empty()
    }
}
