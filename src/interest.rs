use alloc::vec::Vec;

use crate::{
    content::{CompleteName, ContentObject, PublisherDigest},
    name::{Name, NameComponent},
};

/// Ranking applied when several content objects match one interest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChildSelector {
    /// The smallest child after the reference component.
    Next,
    /// The greatest child.
    Last,
}

/// Components to skip at the first position after the interest's name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Exclude {
    through: Option<NameComponent>,
    // Sorted and free of duplicates
    components: Vec<NameComponent>,
}

impl Exclude {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes every component ordered at or before `component`.
    pub fn through(component: NameComponent) -> Self {
        Self {
            through: Some(component),
            components: Vec::new(),
        }
    }

    pub fn excluding(mut self, component: impl Into<NameComponent>) -> Self {
        let component = component.into();
        if let Err(idx) = self.components.binary_search(&component) {
            self.components.insert(idx, component);
        }
        self
    }

    pub fn upper_bound(&self) -> Option<&NameComponent> {
        self.through.as_ref()
    }

    pub fn contains(&self, component: &NameComponent) -> bool {
        if let Some(through) = &self.through {
            if component <= through {
                return true;
            }
        }
        self.components.binary_search(component).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.through.is_none() && self.components.is_empty()
    }
}

/// Where an answer to an interest may come from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnswerOriginKind(u8);

impl AnswerOriginKind {
    pub const CONTENT_STORE: Self = Self(1);
    pub const GENERATED: Self = Self(2);
    pub const STALE: Self = Self(4);
    pub const MARK_STALE: Self = Self(8);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for AnswerOriginKind {
    fn default() -> Self {
        Self::CONTENT_STORE.union(Self::GENERATED)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Interest {
    name: Name,
    child_selector: Option<ChildSelector>,
    exclude: Option<Exclude>,
    min_suffix_components: Option<usize>,
    max_suffix_components: Option<usize>,
    publisher: Option<PublisherDigest>,
    scope: Option<u8>,
    answer_origin: Option<AnswerOriginKind>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            child_selector: None,
            exclude: None,
            min_suffix_components: None,
            max_suffix_components: None,
            publisher: None,
            scope: None,
            answer_origin: None,
        }
    }

    /// Asks for the child of `reference.truncated(prefix_count)` that follows
    /// the reference's own component at that position.
    pub fn next(reference: &Name, prefix_count: usize) -> Self {
        Self::after_reference(reference, prefix_count, ChildSelector::Next)
    }

    /// Asks for the greatest child of `reference.truncated(prefix_count)` that
    /// is later than the reference's own component at that position.
    pub fn last(reference: &Name, prefix_count: usize) -> Self {
        Self::after_reference(reference, prefix_count, ChildSelector::Last)
    }

    fn after_reference(reference: &Name, prefix_count: usize, selector: ChildSelector) -> Self {
        let mut interest = Interest::new(reference.truncated(prefix_count));
        interest.child_selector = Some(selector);
        interest.exclude = reference.component(prefix_count).cloned().map(Exclude::through);
        interest
    }

    pub fn with_child_selector(mut self, selector: ChildSelector) -> Self {
        self.child_selector = Some(selector);
        self
    }

    pub fn with_exclude(mut self, exclude: Exclude) -> Self {
        self.exclude = if exclude.is_empty() { None } else { Some(exclude) };
        self
    }

    pub fn with_suffix_components(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_suffix_components = min;
        self.max_suffix_components = max;
        self
    }

    pub fn with_publisher(mut self, publisher: PublisherDigest) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_scope(mut self, scope: u8) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_answer_origin(mut self, kind: AnswerOriginKind) -> Self {
        self.answer_origin = Some(kind);
        self
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn child_selector(&self) -> Option<ChildSelector> {
        self.child_selector
    }

    pub fn exclude(&self) -> Option<&Exclude> {
        self.exclude.as_ref()
    }

    pub fn suffix_components(&self) -> (Option<usize>, Option<usize>) {
        (self.min_suffix_components, self.max_suffix_components)
    }

    pub fn publisher(&self) -> Option<&PublisherDigest> {
        self.publisher.as_ref()
    }

    pub fn scope(&self) -> Option<u8> {
        self.scope
    }

    pub fn answer_origin(&self) -> AnswerOriginKind {
        self.answer_origin.unwrap_or_default()
    }

    /// The component a `NEXT`/`LAST` selector ranks against, if any.
    pub fn reference(&self) -> Option<&NameComponent> {
        self.child_selector?;
        self.exclude.as_ref()?.upper_bound()
    }

    pub fn accepts_generated(&self) -> bool {
        self.answer_origin().contains(AnswerOriginKind::GENERATED)
    }

    /// Whether `target` satisfies this interest on its own. Child selectors do
    /// not take part here, they only rank several matching candidates.
    pub fn matches(&self, target: &CompleteName<'_>) -> bool {
        let prefix_count = self.name.component_count();

        // An interest naming the implicit digest asks for exactly one object
        if let Some(digest) = target.digest {
            if prefix_count == target.name.component_count() + 1
                && self.name.equals_up_to(target.name, prefix_count - 1)
                && self.name.last_component().map(|c| c.bytes()) == Some(&digest.0[..])
            {
                return self.matches_publisher(target);
            }
        }

        if !self.name.is_prefix_of(target.name) {
            return false;
        }

        if let Some(exclude) = &self.exclude {
            if let Some(next) = target.name.component(prefix_count) {
                if exclude.contains(next) {
                    return false;
                }
            }
        }

        // The implicit digest is not counted as a suffix component
        let suffix = target.name.component_count() - prefix_count;
        if self.min_suffix_components.is_some_and(|min| suffix < min) {
            return false;
        }
        if self.max_suffix_components.is_some_and(|max| suffix > max) {
            return false;
        }

        self.matches_publisher(target)
    }

    pub fn matches_object(&self, object: &ContentObject) -> bool {
        self.matches(&object.complete_name())
    }

    fn matches_publisher(&self, target: &CompleteName<'_>) -> bool {
        match &self.publisher {
            Some(publisher) => target.publisher == Some(publisher),
            None => true,
        }
    }
}

impl From<Name> for Interest {
    fn from(value: Name) -> Self {
        Interest::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{AnswerOriginKind, ChildSelector, Exclude, Interest};
    use crate::{
        content::{CompleteName, PublisherDigest},
        hash::Sha256Digest,
        name::{Name, NameComponent},
        profiles::segment_name,
    };

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn matches(interest: &Interest, s: &str) -> bool {
        interest.matches(&CompleteName::new(&name(s)))
    }

    #[test]
    fn test_prefix_match() {
        let interest = Interest::new(name("/a/b"));
        assert!(matches(&interest, "/a/b"));
        assert!(matches(&interest, "/a/b/c"));
        assert!(!matches(&interest, "/a"));
        assert!(!matches(&interest, "/x/y"));
        assert!(Interest::new(Name::new()).matches(&CompleteName::new(&name("/q"))));
    }

    #[test]
    fn test_exclusion() {
        let interest =
            Interest::new(name("/a")).with_exclude(Exclude::new().excluding("b").excluding("d"));
        assert!(!matches(&interest, "/a/b"));
        assert!(!matches(&interest, "/a/d/e"));
        assert!(matches(&interest, "/a/c"));
        // Nothing follows the prefix, so there is nothing to exclude
        assert!(matches(&interest, "/a"));

        let through = Interest::new(name("/a")).with_exclude(Exclude::through("m".into()));
        assert!(!matches(&through, "/a/a"));
        assert!(!matches(&through, "/a/m"));
        assert!(matches(&through, "/a/n"));
    }

    #[test]
    fn test_suffix_bounds() {
        let interest = Interest::new(name("/a")).with_suffix_components(Some(1), Some(2));
        assert!(!matches(&interest, "/a"));
        assert!(matches(&interest, "/a/b"));
        assert!(matches(&interest, "/a/b/c"));
        assert!(!matches(&interest, "/a/b/c/d"));
    }

    #[test]
    fn test_publisher() {
        let publisher = PublisherDigest([7; 32]);
        let other = PublisherDigest([8; 32]);
        let interest = Interest::new(name("/a")).with_publisher(publisher);
        let n = name("/a/b");

        assert!(!interest.matches(&CompleteName::new(&n)));
        let mut target = CompleteName::new(&n);
        target.publisher = Some(&other);
        assert!(!interest.matches(&target));
        target.publisher = Some(&publisher);
        assert!(interest.matches(&target));
    }

    #[test]
    fn test_full_name() {
        let digest = Sha256Digest([3; 32]);
        let n = name("/a/b");
        let target = CompleteName {
            name: &n,
            publisher: None,
            digest: Some(&digest),
        };

        let exact = Interest::new(n.adding_component(digest.to_component()));
        assert!(exact.matches(&target));

        let wrong = Interest::new(n.adding_component(NameComponent::new(&[4; 32])));
        assert!(!wrong.matches(&target));
    }

    #[test]
    fn test_next_and_last() {
        let reference = segment_name(&name("/foo/bar/v1"), 2);
        let next = Interest::next(&reference, 3);
        assert_eq!(next.name(), &name("/foo/bar/v1"));
        assert_eq!(next.child_selector(), Some(ChildSelector::Next));
        assert_eq!(next.reference(), reference.last_component());

        let base = name("/foo/bar/v1");
        assert!(!next.matches(&CompleteName::new(&segment_name(&base, 1))));
        assert!(!next.matches(&CompleteName::new(&segment_name(&base, 2))));
        assert!(next.matches(&CompleteName::new(&segment_name(&base, 3))));

        let last = Interest::last(&reference, 3);
        assert_eq!(last.child_selector(), Some(ChildSelector::Last));
        assert!(last.matches(&CompleteName::new(&segment_name(&base, 9))));

        // Without a component at the prefix position nothing is excluded
        let open = Interest::next(&base, 3);
        assert!(open.exclude().is_none());
        assert!(open.reference().is_none());
    }

    #[test]
    fn test_answer_origin() {
        let interest = Interest::new(name("/a"));
        assert!(interest.accepts_generated());
        let cached_only = interest.with_answer_origin(AnswerOriginKind::CONTENT_STORE);
        assert!(!cached_only.accepts_generated());
    }
}
