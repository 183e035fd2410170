//! Composable list editing operations (`SdfListOp`).

use std::fmt::Debug;

use strum::{Display, EnumIter};
use thiserror::Error;

/// Which bucket of a [ListOp] an edit writes to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ListOpType {
    #[default]
    Explicit,
    Added,
    Deleted,
    Appended,
    Prepended,
    Ordered,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListOpError {
    #[error("Duplicate item '{item}' in {ty} list")]
    DuplicateItem { item: String, ty: ListOpType },
}

/// A list edit: either an explicit replacement or a set of add / delete /
/// append / prepend / reorder operations applied to an inherited list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOp<T> {
    pub explicit: bool,
    pub explicit_items: Vec<T>,
    pub added_items: Vec<T>,
    pub prepended_items: Vec<T>,
    pub appended_items: Vec<T>,
    pub deleted_items: Vec<T>,
    pub ordered_items: Vec<T>,
}

impl<T> Default for ListOp<T> {
    fn default() -> Self {
        Self {
            explicit: false,
            explicit_items: Vec::new(),
            added_items: Vec::new(),
            prepended_items: Vec::new(),
            appended_items: Vec::new(),
            deleted_items: Vec::new(),
            ordered_items: Vec::new(),
        }
    }
}

pub type TokenListOp = ListOp<String>;
pub type StringListOp = ListOp<String>;
pub type PathListOp = ListOp<super::Path>;
pub type ReferenceListOp = ListOp<super::Reference>;
pub type PayloadListOp = ListOp<super::Payload>;
pub type IntListOp = ListOp<i32>;
pub type UintListOp = ListOp<u32>;
pub type Int64ListOp = ListOp<i64>;
pub type Uint64ListOp = ListOp<u64>;

impl<T: Clone + PartialEq + Debug> ListOp<T> {
    /// Creates an explicit list op holding `items`.
    pub fn explicit(items: Vec<T>) -> Result<Self, ListOpError> {
        let mut op = Self::default();
        op.set_items(items, ListOpType::Explicit)?;
        Ok(op)
    }

    #[inline]
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Whether any bucket holds items (or the op is an explicit empty list).
    pub fn has_keys(&self) -> bool {
        if self.explicit {
            return true;
        }

        !(self.added_items.is_empty()
            && self.prepended_items.is_empty()
            && self.appended_items.is_empty()
            && self.deleted_items.is_empty()
            && self.ordered_items.is_empty())
    }

    pub fn items(&self, ty: ListOpType) -> &[T] {
        match ty {
            ListOpType::Explicit => &self.explicit_items,
            ListOpType::Added => &self.added_items,
            ListOpType::Deleted => &self.deleted_items,
            ListOpType::Appended => &self.appended_items,
            ListOpType::Prepended => &self.prepended_items,
            ListOpType::Ordered => &self.ordered_items,
        }
    }

    fn items_mut(&mut self, ty: ListOpType) -> &mut Vec<T> {
        match ty {
            ListOpType::Explicit => &mut self.explicit_items,
            ListOpType::Added => &mut self.added_items,
            ListOpType::Deleted => &mut self.deleted_items,
            ListOpType::Appended => &mut self.appended_items,
            ListOpType::Prepended => &mut self.prepended_items,
            ListOpType::Ordered => &mut self.ordered_items,
        }
    }

    /// Overwrites the bucket for `ty` with `items`. Switching between explicit
    /// and non-explicit edits empties every bucket first, otherwise the other
    /// buckets are left untouched. Items must be unique within the edit.
    pub fn set_items(&mut self, items: Vec<T>, ty: ListOpType) -> Result<(), ListOpError> {
        for (i, item) in items.iter().enumerate() {
            if items[..i].contains(item) {
                return Err(ListOpError::DuplicateItem {
                    item: format!("{item:?}"),
                    ty,
                });
            }
        }

        let explicit = ty == ListOpType::Explicit;
        if explicit != self.explicit {
            self.explicit = explicit;
            for bucket in [
                &mut self.explicit_items,
                &mut self.added_items,
                &mut self.prepended_items,
                &mut self.appended_items,
                &mut self.deleted_items,
                &mut self.ordered_items,
            ] {
                bucket.clear();
            }
        }

        *self.items_mut(ty) = items;

        Ok(())
    }

    /// Applies this op to `base` and returns the resulting list.
    ///
    /// An explicit op replaces `base`. Otherwise added, prepended and appended
    /// items are merged in, deleted items are removed and finally the list is
    /// reordered by `ordered_items`.
    pub fn apply_operations(&self, base: &[T]) -> Vec<T> {
        if self.explicit {
            return self.explicit_items.clone();
        }

        let mut result = base.to_vec();

        for item in &self.added_items {
            if !result.contains(item) {
                result.push(item.clone());
            }
        }

        if !self.prepended_items.is_empty() {
            result.retain(|item| !self.prepended_items.contains(item));
            let mut prepended = self.prepended_items.clone();
            prepended.append(&mut result);
            result = prepended;
        }

        if !self.appended_items.is_empty() {
            result.retain(|item| !self.appended_items.contains(item));
            result.extend(self.appended_items.iter().cloned());
        }

        result.retain(|item| !self.deleted_items.contains(item));

        if !self.ordered_items.is_empty() {
            reorder(&mut result, &self.ordered_items);
        }

        result
    }

    /// Result of applying this op to an empty list.
    pub fn applied_items(&self) -> Vec<T> {
        self.apply_operations(&[])
    }
}

/// Moves items named in `order` to the front in that order, keeping items not
/// mentioned after the last ordered item they followed.
fn reorder<T: Clone + PartialEq>(items: &mut Vec<T>, order: &[T]) {
    let mut result: Vec<T> = Vec::with_capacity(items.len());
    let mut rest: Vec<T> = Vec::new();

    // Items that are not in `order` stay attached to the ordered item before them.
    let mut groups: Vec<(T, Vec<T>)> = Vec::new();
    for item in items.iter() {
        if order.contains(item) {
            groups.push((item.clone(), Vec::new()));
        } else if let Some((_, tail)) = groups.last_mut() {
            tail.push(item.clone());
        } else {
            rest.push(item.clone());
        }
    }

    result.append(&mut rest);
    for key in order {
        if let Some(pos) = groups.iter().position(|(item, _)| item == key) {
            let (item, mut tail) = groups.remove(pos);
            result.push(item);
            result.append(&mut tail);
        }
    }

    *items = result;
}
