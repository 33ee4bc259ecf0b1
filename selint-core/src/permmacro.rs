// SPDX-License-Identifier: Apache-2.0

//! Permission-macro suggestion: given a class and the permission set an
//! `allow` rule actually uses, suggest a refpolicy permission macro
//! (`read_file_perms`, `create_dir_perms`, ...) that covers it.
//!
//! Each known permission carries two 32-bit masks: a raw bit for the
//! permission itself, and an extended mask that additionally sets the
//! bits of permissions it's reasonable to pull in along with it (e.g.
//! `open` extends `getattr`, `write` extends `append`). A permission
//! macro is only proposed if its own raw mask is a subset of the rule's
//! extended mask, so proposing it never asks the caller to grant more
//! than the original rule already implies.

use std::collections::HashMap;

pub type Mask = u32;

pub const EMPTY: Mask = 0;
const UNCOVERED: Mask = 1 << 31;

macro_rules! bit {
    ($n:expr) => {
        1u32 << $n
    };
}

const IOCTL: Mask = bit!(1);
const READ: Mask = bit!(2);
const WRITE: Mask = bit!(3);
const CREATE: Mask = bit!(4);
const GETATTR: Mask = bit!(5);
const SETATTR: Mask = bit!(6);
const LOCK: Mask = bit!(7);
const RELABELFROM: Mask = bit!(8);
const RELABELTO: Mask = bit!(9);
const APPEND: Mask = bit!(10);
const MAP: Mask = bit!(11);
const UNLINK: Mask = bit!(12);
const LINK: Mask = bit!(13);
const RENAME: Mask = bit!(14);
const EXECUTE: Mask = bit!(15);
const MOUNTON: Mask = bit!(16);
const OPEN: Mask = bit!(17);
const WATCH: Mask = bit!(18);
const ADDNAME: Mask = bit!(19);
const REMOVENAME: Mask = bit!(20);
const REPARENT: Mask = bit!(21);
const SEARCH: Mask = bit!(23);
const RMDIR: Mask = bit!(24);
const EXECNOTRANS: Mask = bit!(25);
const ENTRYPOINT: Mask = bit!(26);

const READ_X: Mask = READ | IOCTL | GETATTR | SEARCH | LOCK;
const LOCK_X: Mask = LOCK | GETATTR;
const APPEND_X: Mask = APPEND | GETATTR;
const WRITE_X: Mask = WRITE | IOCTL | GETATTR | APPEND | LOCK;
const CREATE_X: Mask = CREATE | GETATTR | LINK;
const SETATTR_X: Mask = SETATTR | GETATTR;
const MAP_X: Mask = MAP | IOCTL | GETATTR;
const UNLINK_X: Mask = UNLINK | GETATTR | RMDIR;
const LINK_X: Mask = LINK | GETATTR;
const RENAME_X: Mask = RENAME | GETATTR;
const OPEN_X: Mask = OPEN | GETATTR;
const EXECUTE_X: Mask = EXECUTE | READ | GETATTR | MAP;
const RELABELFROM_X: Mask = RELABELFROM | GETATTR;
const RELABELTO_X: Mask = RELABELTO | GETATTR;
const MOUNTON_X: Mask = MOUNTON | GETATTR;
const WATCH_X: Mask = WATCH | READ;
const ADDNAME_X: Mask = ADDNAME | WRITE_X;
const REMOVENAME_X: Mask = REMOVENAME | WRITE_X;
const REPARENT_X: Mask = REPARENT | GETATTR;
const SEARCH_X: Mask = SEARCH | GETATTR;
const RMDIR_X: Mask = RMDIR | UNLINK_X;
const EXECNOTRANS_X: Mask = EXECNOTRANS | EXECUTE_X;

/// `(name, raw bit, extended mask)` for every permission the engine
/// recognizes. Unrecognized permissions fall back to [`UNCOVERED`].
const PERM_TABLE: &[(&str, Mask, Mask)] = &[
    ("ioctl", IOCTL, IOCTL),
    ("read", READ, READ_X),
    ("write", WRITE, WRITE_X),
    ("create", CREATE, CREATE_X),
    ("getattr", GETATTR, GETATTR),
    ("setattr", SETATTR, SETATTR_X),
    ("lock", LOCK, LOCK_X),
    ("relabelfrom", RELABELFROM, RELABELFROM_X),
    ("relabelto", RELABELTO, RELABELTO_X),
    ("append", APPEND, APPEND_X),
    ("map", MAP, MAP_X),
    ("unlink", UNLINK, UNLINK_X),
    ("link", LINK, LINK_X),
    ("rename", RENAME, RENAME_X),
    ("execute", EXECUTE, EXECUTE_X),
    ("mounton", MOUNTON, MOUNTON_X),
    ("open", OPEN, OPEN_X),
    ("watch", WATCH, WATCH_X),
    ("add_name", ADDNAME, ADDNAME_X),
    ("remove_name", REMOVENAME, REMOVENAME_X),
    ("reparent", REPARENT, REPARENT_X),
    ("search", SEARCH, SEARCH_X),
    ("rmdir", RMDIR, RMDIR_X),
    ("execute_no_trans", EXECNOTRANS, EXECNOTRANS_X),
    ("entrypoint", ENTRYPOINT, ENTRYPOINT),
    ("quotaon", UNCOVERED, UNCOVERED),
    ("audit_access", UNCOVERED, UNCOVERED),
    ("execmod", UNCOVERED, UNCOVERED),
    ("watch_mount", UNCOVERED, UNCOVERED),
    ("watch_sb", UNCOVERED, UNCOVERED),
    ("watch_with_perm", UNCOVERED, UNCOVERED),
    ("watch_reads", UNCOVERED, UNCOVERED),
];

fn perm_masks(name: &str) -> (Mask, Mask) {
    PERM_TABLE
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, raw, ext)| (*raw, *ext))
        .unwrap_or((UNCOVERED, UNCOVERED))
}

/// Fold a list of raw permission names into `(raw, extended)` masks.
pub fn compute_perm_mask<'a>(permissions: impl IntoIterator<Item = &'a str>) -> (Mask, Mask) {
    let mut raw = EMPTY;
    let mut extended = EMPTY;
    for perm in permissions {
        let (p_raw, p_ext) = perm_masks(perm);
        raw |= p_raw;
        extended |= p_ext;
    }
    (raw, extended)
}

/// The object-class families a permission macro can belong to, keyed by
/// its name's suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroClass {
    Dir,
    File,
    LnkFile,
    ChrFile,
    BlkFile,
    SockFile,
    FifoFile,
}

impl MacroClass {
    fn from_macro_name(name: &str) -> Option<MacroClass> {
        if name.ends_with("_dir_perms") {
            Some(MacroClass::Dir)
        } else if name.ends_with("_lnk_file_perms") {
            Some(MacroClass::LnkFile)
        } else if name.ends_with("_chr_file_perms") || name.ends_with("_term_perms") {
            Some(MacroClass::ChrFile)
        } else if name.ends_with("_blk_file_perms") {
            Some(MacroClass::BlkFile)
        } else if name.ends_with("_sock_file_perms") {
            Some(MacroClass::SockFile)
        } else if name.ends_with("_fifo_file_perms") {
            Some(MacroClass::FifoFile)
        } else if name.ends_with("_file_perms") {
            Some(MacroClass::File)
        } else {
            None
        }
    }

    fn from_class_name(class: &str) -> Option<MacroClass> {
        match class {
            "dir" => Some(MacroClass::Dir),
            "file" => Some(MacroClass::File),
            "lnk_file" => Some(MacroClass::LnkFile),
            "chr_file" => Some(MacroClass::ChrFile),
            "blk_file" => Some(MacroClass::BlkFile),
            "sock_file" => Some(MacroClass::SockFile),
            "fifo_file" => Some(MacroClass::FifoFile),
            _ => None,
        }
    }
}

/// Which class family a `<name>_perms` macro belongs to, if its suffix
/// matches one. Exposed for checks that need to compare a permission
/// macro's implied class against the class an av rule actually uses.
pub(crate) fn macro_class_for_name(name: &str) -> Option<MacroClass> {
    MacroClass::from_macro_name(name)
}

/// Which class family an object class name belongs to, if any.
pub(crate) fn macro_class_for_class_name(class: &str) -> Option<MacroClass> {
    MacroClass::from_class_name(class)
}

#[derive(Debug, Clone)]
struct MacroEntry {
    name: String,
    mask_raw: Mask,
}

/// The table of known permission macros, bucketed by class and kept
/// sorted ascending by permission count so the first eligible match in
/// [`suggest`] is also the smallest.
#[derive(Debug, Default)]
pub struct PermMacroTable {
    by_class: HashMap<MacroClass, Vec<MacroEntry>>,
}

impl PermMacroTable {
    pub fn new() -> PermMacroTable {
        PermMacroTable::default()
    }

    /// Register one `<name>_<suffix>_perms` macro with its defining
    /// permission list. Macros that include an unrecognized permission,
    /// or whose name doesn't match a supported class suffix, are
    /// silently skipped.
    pub fn register<'a>(&mut self, name: &str, permissions: impl IntoIterator<Item = &'a str>) {
        let Some(class) = MacroClass::from_macro_name(name) else {
            return;
        };

        let (mask_raw, _) = compute_perm_mask(permissions);
        if mask_raw & UNCOVERED != 0 {
            return;
        }

        let bucket = self.by_class.entry(class).or_default();
        let count = mask_raw.count_ones();
        let position = bucket
            .iter()
            .position(|entry| count < entry.mask_raw.count_ones())
            .unwrap_or(bucket.len());
        bucket.insert(
            position,
            MacroEntry {
                name: name.to_string(),
                mask_raw,
            },
        );
    }

    /// Suggest a permission macro covering `permissions` on `class`, if
    /// one exists and isn't already in `permissions`. Returns the
    /// winning macro name plus which of the rule's own permission
    /// strings it would replace.
    pub fn suggest(&self, class: &str, permissions: &[String]) -> Option<Suggestion> {
        let class = MacroClass::from_class_name(class)?;
        let bucket = self.by_class.get(&class)?;

        let perm_refs: Vec<&str> = permissions.iter().map(String::as_str).collect();
        let (mask_raw, mut mask_extended) = compute_perm_mask(perm_refs.iter().copied());

        if (mask_raw & !UNCOVERED).count_ones() < 2 {
            return None;
        }

        if mask_extended & (CREATE | WRITE) != 0 {
            mask_extended |= SETATTR_X;
        }
        if mask_extended & (CREATE | UNLINK) != 0 {
            mask_extended |= RENAME_X | REPARENT_X;
        }

        let mut best: Option<(&MacroEntry, u32, u32)> = None;

        for entry in bucket {
            if entry.mask_raw & !mask_extended != 0 {
                continue;
            }

            let coverage = (entry.mask_raw & mask_raw).count_ones();
            if coverage < 2 {
                continue;
            }

            if let Some((_, best_coverage, best_extending)) = best {
                if coverage < best_coverage {
                    continue;
                }
                let extending = (entry.mask_raw & !mask_raw).count_ones();
                if coverage == best_coverage && extending > best_extending {
                    continue;
                }
            }

            let matched_count = perm_refs
                .iter()
                .filter(|perm| {
                    let (p_raw, _) = perm_masks(perm);
                    p_raw & (entry.mask_raw & mask_raw) == p_raw
                })
                .count();
            if matched_count < 2 {
                continue;
            }

            let extending = (entry.mask_raw & !mask_raw).count_ones();
            best = Some((entry, coverage, extending));
        }

        let (winner, ..) = best?;

        if permissions.iter().any(|p| p == &winner.name) {
            return None;
        }

        let matched_mask = winner.mask_raw & mask_raw;
        let matched: Vec<String> = perm_refs
            .iter()
            .filter(|perm| {
                let (p_raw, _) = perm_masks(perm);
                p_raw & matched_mask == p_raw
            })
            .map(|s| s.to_string())
            .collect();
        let added: Vec<String> = PERM_TABLE
            .iter()
            .filter(|(_, raw, _)| winner.mask_raw & !mask_raw & raw == *raw && *raw != EMPTY)
            .map(|(name, _, _)| name.to_string())
            .collect();

        Some(Suggestion {
            macro_name: winner.name.clone(),
            replaces: matched,
            adds: added,
        })
    }
}

/// A proposed permission-macro substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub macro_name: String,
    pub replaces: Vec<String>,
    pub adds: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn suggests_read_file_perms() {
        let mut table = PermMacroTable::new();
        table.register("read_file_perms", ["open", "read", "getattr", "ioctl", "lock"]);

        let suggestion = table
            .suggest("file", &strs(&["open", "read", "getattr"]))
            .expect("expected a suggestion");
        assert_eq!(suggestion.macro_name, "read_file_perms");
    }

    #[test]
    fn does_not_suggest_macro_already_in_use() {
        let mut table = PermMacroTable::new();
        table.register("read_file_perms", ["open", "read", "getattr", "ioctl", "lock"]);

        assert!(table
            .suggest("file", &strs(&["read_file_perms"]))
            .is_none());
    }

    #[test]
    fn single_permission_never_triggers_a_suggestion() {
        let mut table = PermMacroTable::new();
        table.register("read_file_perms", ["open", "read", "getattr", "ioctl", "lock"]);

        assert!(table.suggest("file", &strs(&["read"])).is_none());
    }

    #[test]
    fn macro_with_uncovered_permission_is_never_registered() {
        let mut table = PermMacroTable::new();
        table.register("weird_file_perms", ["read", "quotaon"]);
        assert!(table.suggest("file", &strs(&["read", "write"])).is_none());
    }

    #[test]
    fn create_and_write_extend_to_setattr() {
        let mut table = PermMacroTable::new();
        table.register("manage_file_perms", ["create", "write", "setattr", "getattr", "link", "append", "ioctl", "lock"]);

        let suggestion = table
            .suggest("file", &strs(&["create", "write"]))
            .expect("expected a suggestion via the create+write->setattr extension");
        assert_eq!(suggestion.macro_name, "manage_file_perms");
    }
}
