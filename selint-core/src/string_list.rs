// SPDX-License-Identifier: Apache-2.0

//! Owned sequences of strings with the two positional markers the parser
//! attaches to interface-call arguments.

/// One entry of a [`StringList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringItem {
    pub text: String,
    /// A space appeared in the source where a call separator (`,`) was
    /// expected. Feeds W-007.
    pub has_incorrect_space: bool,
    /// This token begins a new positional argument (as opposed to
    /// continuing the previous one after a stray space).
    pub arg_start: bool,
}

impl StringItem {
    pub fn new(text: impl Into<String>) -> StringItem {
        StringItem {
            text: text.into(),
            has_incorrect_space: false,
            arg_start: true,
        }
    }
}

/// An ordered sequence of owned strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList(Vec<StringItem>);

impl StringList {
    pub fn new() -> StringList {
        StringList(Vec::new())
    }

    pub fn single(text: impl Into<String>) -> StringList {
        StringList(vec![StringItem::new(text)])
    }

    pub fn from_strs<I, S>(items: I) -> StringList
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StringList(items.into_iter().map(StringItem::new).collect())
    }

    pub fn push(&mut self, item: StringItem) {
        self.0.push(item);
    }

    pub fn push_str(&mut self, text: impl Into<String>) {
        self.0.push(StringItem::new(text));
    }

    /// Move `other`'s items onto the end of `self`, without copying.
    pub fn concat(&mut self, other: StringList) {
        self.0.extend(other.0);
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|item| item.text == needle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StringItem> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join_with_spaces(&self) -> String {
        self.0
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn first(&self) -> Option<&StringItem> {
        self.0.first()
    }

    pub fn as_slice(&self) -> &[StringItem] {
        &self.0
    }
}

impl FromIterator<StringItem> for StringList {
    fn from_iter<T: IntoIterator<Item = StringItem>>(iter: T) -> Self {
        StringList(iter.into_iter().collect())
    }
}

/// The flavor tag attached to a [`NameEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameFlavor {
    Unknown,
    Type,
    TypeAttribute,
    TypeOrAttribute,
    Role,
    RoleAttribute,
    RoleOrAttribute,
    Class,
    Permission,
    User,
    Bool,
}

impl NameFlavor {
    /// The reflexive compatibility lattice: `type <= type-or-attribute >=
    /// type-attribute`, similarly for roles; `unknown` is compatible with
    /// anything; distinct concrete kinds are incompatible.
    pub fn is_compatible(self, other: NameFlavor) -> bool {
        use NameFlavor::*;

        if self == other || self == Unknown || other == Unknown {
            return true;
        }

        matches!(
            (self, other),
            (Type, TypeOrAttribute)
                | (TypeOrAttribute, Type)
                | (TypeAttribute, TypeOrAttribute)
                | (TypeOrAttribute, TypeAttribute)
                | (Role, RoleOrAttribute)
                | (RoleOrAttribute, Role)
                | (RoleAttribute, RoleOrAttribute)
                | (RoleOrAttribute, RoleAttribute)
        )
    }
}

/// A single tagged identifier reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub name: String,
    pub flavor: NameFlavor,
    /// Present only for `NameFlavor::Class` entries: the permissions
    /// associated with the class at declaration.
    pub traits: Option<StringList>,
}

impl NameEntry {
    pub fn new(name: impl Into<String>, flavor: NameFlavor) -> NameEntry {
        NameEntry {
            name: name.into(),
            flavor,
            traits: None,
        }
    }

    pub fn with_traits(name: impl Into<String>, flavor: NameFlavor, traits: StringList) -> NameEntry {
        NameEntry {
            name: name.into(),
            flavor,
            traits: Some(traits),
        }
    }
}

/// An ordered sequence of flavor-tagged identifier references.
#[derive(Debug, Clone, Default)]
pub struct NameList(Vec<NameEntry>);

impl NameList {
    pub fn new() -> NameList {
        NameList(Vec::new())
    }

    pub fn single(name: impl Into<String>, flavor: NameFlavor) -> NameList {
        NameList(vec![NameEntry::new(name, flavor)])
    }

    pub fn from_strings(sl: &StringList, flavor: NameFlavor) -> NameList {
        NameList::from_strings_with_traits(sl, flavor, None)
    }

    pub fn from_strings_with_traits(
        sl: &StringList,
        flavor: NameFlavor,
        traits: Option<&StringList>,
    ) -> NameList {
        NameList(
            sl.iter()
                .map(|item| NameEntry {
                    name: item.text.clone(),
                    flavor,
                    traits: traits.cloned(),
                })
                .collect(),
        )
    }

    pub fn push(&mut self, entry: NameEntry) {
        self.0.push(entry);
    }

    /// Move `tail`'s entries onto the end of `self`.
    pub fn concat(&mut self, tail: NameList) {
        self.0.extend(tail.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &NameEntry> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list contains an entry with this name at a compatible
    /// flavor.
    pub fn contains_name(&self, name: &NameEntry) -> bool {
        self.0
            .iter()
            .any(|entry| entry.name == name.name && entry.flavor.is_compatible(name.flavor))
    }

    pub fn contains_str(&self, needle: &str, flavor: NameFlavor) -> bool {
        self.0
            .iter()
            .any(|entry| entry.name == needle && entry.flavor.is_compatible(flavor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_allows_type_and_type_or_attribute() {
        assert!(NameFlavor::Type.is_compatible(NameFlavor::TypeOrAttribute));
        assert!(NameFlavor::TypeAttribute.is_compatible(NameFlavor::TypeOrAttribute));
        assert!(!NameFlavor::Type.is_compatible(NameFlavor::TypeAttribute));
        assert!(!NameFlavor::Role.is_compatible(NameFlavor::Type));
    }

    #[test]
    fn unknown_is_compatible_with_everything() {
        assert!(NameFlavor::Unknown.is_compatible(NameFlavor::Class));
        assert!(NameFlavor::Permission.is_compatible(NameFlavor::Unknown));
    }

    #[test]
    fn contains_name_honors_lattice() {
        let mut list = NameList::new();
        list.push(NameEntry::new("foo_t", NameFlavor::TypeOrAttribute));
        assert!(list.contains_str("foo_t", NameFlavor::Type));
        assert!(!list.contains_str("foo_t", NameFlavor::Role));
    }

    #[test]
    fn string_list_concat_is_a_move() {
        let mut a = StringList::from_strs(["x", "y"]);
        let b = StringList::from_strs(["z"]);
        a.concat(b);
        assert_eq!(a.join_with_spaces(), "x y z");
    }
}
