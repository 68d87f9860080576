// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::{Cell, Ref, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::error::Location;
use crate::pda::PdaGraph;
use crate::region::TokenRegion;
use crate::symbol::{PredType, Symbol, SymbolKind};

/// Epsilon marker in the first sets.
pub const EPSILON: i64 = -1;

/// One element on a production's right hand side.
#[derive(Debug, Clone)]
pub struct ProdEl {
    lang_el: Symbol,
    commit: bool,
    prior_val: i64,
}

impl ProdEl {
    pub fn new(lang_el: &Symbol) -> Self {
        Self {
            lang_el: lang_el.clone(),
            commit: false,
            prior_val: 0,
        }
    }

    /// Once the element has been shifted, backtracking must not cross back
    /// over the point before it.
    pub fn with_commit(mut self) -> Self {
        self.commit = true;
        self
    }

    pub fn with_prior(mut self, prior_val: i64) -> Self {
        self.prior_val = prior_val;
        self
    }

    pub fn lang_el(&self) -> &Symbol {
        &self.lang_el
    }

    pub fn commit(&self) -> bool {
        self.commit
    }

    pub fn prior_val(&self) -> i64 {
        self.prior_val
    }
}

#[derive(Debug)]
pub struct ProductionData {
    prod_id: i64,
    prod_num: i64,
    lhs: Symbol,
    rhs: Vec<ProdEl>,
    defined_at: Location,
    prod_commit: Cell<bool>,
    red_prior: Cell<i64>,
    collect_ignore_region: RefCell<Option<TokenRegion>>,
    pred_of: RefCell<Option<Symbol>>,
    fsm: RefCell<Option<PdaGraph>>,
    fsm_length: Cell<i64>,
    dot_base: Cell<i64>,
    first_set: RefCell<BTreeSet<i64>>,
    non_term_first_set: RefCell<BTreeSet<i64>>,
    is_left_rec: Cell<bool>,
}

#[derive(Debug, Clone)]
pub struct Production(Rc<ProductionData>);

impl Production {
    pub fn new(
        prod_id: i64,
        prod_num: i64,
        lhs: Symbol,
        rhs: Vec<ProdEl>,
        defined_at: &Location,
    ) -> Self {
        Self(Rc::new(ProductionData {
            prod_id,
            prod_num,
            lhs,
            rhs,
            defined_at: defined_at.clone(),
            prod_commit: Cell::new(false),
            red_prior: Cell::new(0),
            collect_ignore_region: RefCell::new(None),
            pred_of: RefCell::new(None),
            fsm: RefCell::new(None),
            fsm_length: Cell::new(0),
            dot_base: Cell::new(-1),
            first_set: RefCell::new(BTreeSet::new()),
            non_term_first_set: RefCell::new(BTreeSet::new()),
            is_left_rec: Cell::new(false),
        }))
    }

    pub fn prod_id(&self) -> i64 {
        self.0.prod_id
    }

    pub fn prod_num(&self) -> i64 {
        self.0.prod_num
    }

    pub fn lhs(&self) -> &Symbol {
        &self.0.lhs
    }

    pub fn len(&self) -> usize {
        self.0.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.rhs.is_empty()
    }

    pub fn rhs(&self) -> &[ProdEl] {
        &self.0.rhs
    }

    pub fn defined_at(&self) -> &Location {
        &self.0.defined_at
    }

    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A commit over the whole production: reducing it prunes the
    /// backtracking alternatives accumulated while matching it.
    pub fn prod_commit(&self) -> bool {
        self.0.prod_commit.get()
    }

    pub fn set_prod_commit(&self, value: bool) {
        self.0.prod_commit.set(value)
    }

    pub fn red_prior(&self) -> i64 {
        self.0.red_prior.get()
    }

    pub fn set_red_prior(&self, prior: i64) {
        self.0.red_prior.set(prior)
    }

    pub fn collect_ignore_region(&self) -> Option<TokenRegion> {
        self.0.collect_ignore_region.borrow().clone()
    }

    pub fn set_collect_ignore_region(&self, region: &TokenRegion) {
        *self.0.collect_ignore_region.borrow_mut() = Some(region.clone())
    }

    pub fn set_pred_of(&self, lang_el: &Symbol) {
        *self.0.pred_of.borrow_mut() = Some(lang_el.clone())
    }

    /// The symbol whose precedence stands in for this production during
    /// conflict resolution: an explicit override, or the first terminal on
    /// the right hand side carrying a declared precedence.
    pub fn pred_of(&self) -> Option<Symbol> {
        if let Some(lang_el) = &*self.0.pred_of.borrow() {
            return Some(lang_el.clone());
        }
        for prod_el in self.0.rhs.iter() {
            let lang_el = prod_el.lang_el();
            if lang_el.kind() == SymbolKind::Term && lang_el.pred_type() != PredType::None {
                return Some(lang_el.clone());
            }
        }
        None
    }

    pub fn fsm(&self) -> Ref<'_, Option<PdaGraph>> {
        self.0.fsm.borrow()
    }

    pub fn fsm_length(&self) -> i64 {
        self.0.fsm_length.get()
    }

    pub fn dot_base(&self) -> i64 {
        self.0.dot_base.get()
    }

    pub fn first_set(&self) -> Ref<'_, BTreeSet<i64>> {
        self.0.first_set.borrow()
    }

    pub fn non_term_first_set(&self) -> Ref<'_, BTreeSet<i64>> {
        self.0.non_term_first_set.borrow()
    }

    pub fn is_left_rec(&self) -> bool {
        self.0.is_left_rec.get()
    }

    /// Build the production's linear machine: one state per dot position,
    /// one shift transition per element. A collect ignore region prepends a
    /// transition on the region's chained ignore terminal. An element
    /// commit lands on the transitions leaving the state before it.
    pub(crate) fn build_fsm(&self) {
        let mut fsm = PdaGraph::new();
        let mut last = fsm.add_state();
        fsm.set_start_state(last);

        if let Some(region) = self.collect_ignore_region() {
            let ci_lel = region
                .ci_lel()
                .expect("collect ignore region needs its chained ignore token");
            let new_state = fsm.add_state();
            fsm.append_new_trans(last, ci_lel.id(), Some(new_state), true, 0);
            last = new_state;
        }

        for (prod_length, prod_el) in self.0.rhs.iter().enumerate() {
            let value = prod_el.lang_el().id();
            let new_state = fsm.add_state();
            fsm.append_new_trans(last, value, Some(new_state), true, prod_el.prior_val());

            if prod_el.commit() {
                // Insert the commit into transitions out of last.
                let keys: Vec<i64> = fsm.states[last].trans_map.keys().cloned().collect();
                for key in keys {
                    fsm.find_trans_mut(last, key)
                        .unwrap()
                        .commits
                        .insert(prod_length as i64);
                }
            }

            last = new_state;
        }

        fsm.set_fin_state(last);
        self.0.fsm_length.set(fsm.fsm_length());

        if self.prod_commit() {
            let length = self.fsm_length();
            fsm.states[last]
                .pending_commits
                .push((self.prod_id(), length));
        }

        *self.0.fsm.borrow_mut() = Some(fsm);
    }

    /// Give each machine state its dot item id, starting from `dot_base`.
    pub(crate) fn assign_dot_items(&self, dot_base: i64) -> i64 {
        self.0.dot_base.set(dot_base);
        let mut fsm = self.0.fsm.borrow_mut();
        let fsm = fsm.as_mut().expect("machine must be built first");
        let mut dot = dot_base;
        for state in fsm.states.iter_mut() {
            state.dot_set.insert(dot);
            dot += 1;
        }
        dot
    }
}

impl PartialEq for Production {
    fn eq(&self, other: &Self) -> bool {
        self.0.prod_id == other.0.prod_id
    }
}

impl Eq for Production {}

impl PartialOrd for Production {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.prod_id.partial_cmp(&other.0.prod_id)
    }
}

impl Ord for Production {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut string = format!("{}:", self.0.lhs.name());
        if self.0.rhs.len() == 0 {
            string += " <empty>";
        } else {
            for prod_el in self.0.rhs.iter() {
                string += &format!(" {}", prod_el.lang_el());
            }
        };
        write!(f, "{}", string)
    }
}

fn insert_new(set: &RefCell<BTreeSet<i64>>, items: &[i64]) -> bool {
    let mut modified = false;
    let mut set = set.borrow_mut();
    for item in items.iter() {
        if set.insert(*item) {
            modified = true;
        }
    }
    modified
}

fn non_term_first_set_state(
    prod: &Production,
    fsm: &PdaGraph,
    state: usize,
    lang_el_index: &[Option<Symbol>],
    first_non_term_id: i64,
) -> bool {
    let mut modified = false;
    let keys: Vec<i64> = fsm.states[state].trans_map.keys().cloned().collect();
    for key in keys {
        if key < first_non_term_id {
            continue;
        }
        let mut gather = vec![key];
        let mut has_epsilon = false;
        let lel = lang_el_index[key as usize]
            .as_ref()
            .expect("symbol ids are dense");
        for ldef in lel.def_list().iter() {
            for &pid in ldef.non_term_first_set().iter() {
                if pid == EPSILON {
                    has_epsilon = true;
                } else {
                    gather.push(pid);
                }
            }
        }
        if insert_new(&prod.0.non_term_first_set, &gather) {
            modified = true;
        }

        if has_epsilon {
            let to_state = fsm.states[state].trans_map[&key]
                .to_state
                .expect("production machines always shift");
            if fsm.states[to_state].is_final {
                if insert_new(&prod.0.non_term_first_set, &[EPSILON]) {
                    modified = true;
                }
            }
            if non_term_first_set_state(prod, fsm, to_state, lang_el_index, first_non_term_id) {
                modified = true;
            }
        }
    }
    modified
}

/// First fixed point: per production, every non terminal a derivation can
/// begin with, and the epsilon marker where the whole production can come
/// up empty. Left recursion falls straight out of the result.
pub(crate) fn make_non_term_first_sets(
    prod_list: &[Production],
    lang_el_index: &[Option<Symbol>],
    first_non_term_id: i64,
) {
    let mut modified = true;
    while modified {
        modified = false;
        for prod in prod_list.iter() {
            let fsm = prod.fsm();
            let fsm = fsm.as_ref().expect("machine must be built first");
            if fsm.states[fsm.start_state].is_final {
                if insert_new(&prod.0.non_term_first_set, &[EPSILON]) {
                    modified = true;
                }
            }
            if non_term_first_set_state(
                prod,
                fsm,
                fsm.start_state,
                lang_el_index,
                first_non_term_id,
            ) {
                modified = true;
            }
        }
    }

    for prod in prod_list.iter() {
        if prod.non_term_first_set().contains(&prod.lhs().id()) {
            prod.0.is_left_rec.set(true);
        }
    }
}

fn first_set_state(
    prod: &Production,
    fsm: &PdaGraph,
    state: usize,
    lang_el_index: &[Option<Symbol>],
    first_non_term_id: i64,
) -> bool {
    let mut modified = false;
    let keys: Vec<i64> = fsm.states[state].trans_map.keys().cloned().collect();
    for key in keys {
        if key < first_non_term_id {
            if insert_new(&prod.0.first_set, &[key]) {
                modified = true;
            }
            continue;
        }

        let mut gather = vec![key];
        let lel = lang_el_index[key as usize]
            .as_ref()
            .expect("symbol ids are dense");
        if let Some(dup) = lel.term_dup() {
            gather.push(dup.id());
        }
        let mut has_epsilon = false;
        for ldef in lel.def_list().iter() {
            for &pid in ldef.first_set().iter() {
                if pid == EPSILON {
                    has_epsilon = true;
                } else {
                    gather.push(pid);
                }
            }
        }
        if insert_new(&prod.0.first_set, &gather) {
            modified = true;
        }

        if has_epsilon {
            let to_state = fsm.states[state].trans_map[&key]
                .to_state
                .expect("production machines always shift");
            if fsm.states[to_state].is_final {
                if insert_new(&prod.0.first_set, &[EPSILON]) {
                    modified = true;
                }
            }
            if first_set_state(prod, fsm, to_state, lang_el_index, first_non_term_id) {
                modified = true;
            }
        }
    }
    modified
}

/// Second fixed point: the full first sets, terminals included, with term
/// dup ids folded in alongside their originals.
pub(crate) fn make_first_sets(
    prod_list: &[Production],
    lang_el_index: &[Option<Symbol>],
    first_non_term_id: i64,
) {
    let mut modified = true;
    while modified {
        modified = false;
        for prod in prod_list.iter() {
            let fsm = prod.fsm();
            let fsm = fsm.as_ref().expect("machine must be built first");
            if fsm.states[fsm.start_state].is_final {
                if insert_new(&prod.0.first_set, &[EPSILON]) {
                    modified = true;
                }
            }
            if first_set_state(prod, fsm, fsm.start_state, lang_el_index, first_non_term_id) {
                modified = true;
            }
        }
    }
}
