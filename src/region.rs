// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::symbol::Symbol;

/// A lexical sub scanner. When the table driven runtime predicts a terminal
/// it scans in the terminal's region; the companion regions restrict what the
/// scanner may produce (token only excludes ignores, ignore only contains
/// nothing but ignores).
#[derive(Debug, Default)]
pub struct TokenRegionData {
    name: String,
    id: Cell<i64>,
    is_ignore_only: Cell<bool>,
    is_ci_only: Cell<bool>,
    was_empty: Cell<bool>,
    token_only_region: RefCell<Option<TokenRegion>>,
    ignore_only_region: RefCell<Option<TokenRegion>>,
    ci_lel: RefCell<Option<Symbol>>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenRegion(Rc<TokenRegionData>);

impl TokenRegion {
    pub fn new(name: &str, id: i64) -> Self {
        let mut data = TokenRegionData::default();
        data.name = name.to_string();
        data.id.set(id);
        Self(Rc::new(data))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn id(&self) -> i64 {
        self.0.id.get()
    }

    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_ignore_only(&self) -> bool {
        self.0.is_ignore_only.get()
    }

    pub fn set_is_ignore_only(&self, value: bool) {
        self.0.is_ignore_only.set(value)
    }

    pub fn is_ci_only(&self) -> bool {
        self.0.is_ci_only.get()
    }

    pub fn set_is_ci_only(&self, value: bool) {
        self.0.is_ci_only.set(value)
    }

    pub fn was_empty(&self) -> bool {
        self.0.was_empty.get()
    }

    pub fn set_was_empty(&self, value: bool) {
        self.0.was_empty.set(value)
    }

    pub fn token_only_region(&self) -> Option<TokenRegion> {
        self.0.token_only_region.borrow().clone()
    }

    pub fn set_token_only_region(&self, region: &TokenRegion) {
        *self.0.token_only_region.borrow_mut() = Some(region.clone())
    }

    pub fn ignore_only_region(&self) -> Option<TokenRegion> {
        self.0.ignore_only_region.borrow().clone()
    }

    pub fn set_ignore_only_region(&self, region: &TokenRegion) {
        region.set_is_ignore_only(true);
        *self.0.ignore_only_region.borrow_mut() = Some(region.clone())
    }

    /// The chained ignore terminal synthesized for this region, if any.
    pub fn ci_lel(&self) -> Option<Symbol> {
        self.0.ci_lel.borrow().clone()
    }

    pub fn set_ci_lel(&self, lel: &Symbol) {
        *self.0.ci_lel.borrow_mut() = Some(lel.clone())
    }
}

impl PartialEq for TokenRegion {
    fn eq(&self, other: &Self) -> bool {
        self.0.id.get() == other.0.id.get()
    }
}

impl Eq for TokenRegion {}

impl PartialOrd for TokenRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.id.get().partial_cmp(&other.0.id.get())
    }
}

impl Ord for TokenRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl fmt::Display for TokenRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}
