// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::error::Location;
use crate::production::Production;
use crate::region::TokenRegion;

// Fixed ids for the built in language elements. These must line up with the
// constants compiled into the table driven runtime.
pub const LEL_ID_PTR: i64 = 1;
pub const LEL_ID_BOOL: i64 = 2;
pub const LEL_ID_INT: i64 = 3;
pub const LEL_ID_STR: i64 = 4;
pub const LEL_ID_STREAM: i64 = 5;
pub const LEL_ID_IGNORE: i64 = 6;

lazy_static! {
    static ref NAME_CRE: regex::Regex = regex::Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Term,
    NonTerm,
    Unknown,
}

impl Default for SymbolKind {
    fn default() -> Self {
        SymbolKind::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredType {
    None,
    Left,
    Right,
    Nonassoc,
}

impl Default for PredType {
    fn default() -> Self {
        PredType::None
    }
}

impl fmt::Display for PredType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use PredType::*;
        match self {
            None => write!(f, "none"),
            Left => write!(f, "left"),
            Right => write!(f, "right"),
            Nonassoc => write!(f, "nonassoc"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SymbolData {
    name: String,
    defined_at: Location,
    used_at: RefCell<Vec<Location>>,
    kind: Cell<SymbolKind>,
    id: Cell<i64>,
    is_user_term: Cell<bool>,
    is_eof: Cell<bool>,
    is_ci: Cell<bool>,
    is_ignore: Cell<bool>,
    is_literal: Cell<bool>,
    is_repeat: Cell<bool>,
    is_list: Cell<bool>,
    is_opt: Cell<bool>,
    parse_stop: Cell<bool>,
    reduce_first: Cell<bool>,
    no_pre_ignore: Cell<bool>,
    no_post_ignore: Cell<bool>,
    pred_type: Cell<PredType>,
    pred_value: Cell<i64>,
    parser_id: Cell<i64>,
    start_state: Cell<i64>,
    term_dup: RefCell<Option<Symbol>>,
    region: RefCell<Option<TokenRegion>>,
    eof_lel: RefCell<Option<Symbol>>,
    root_def: RefCell<Option<Production>>,
    def_list: RefCell<Vec<Production>>,
}

/// A language element: terminal or non terminal. Shared handle; the id and
/// the various analysis results are filled in by the build passes.
#[derive(Debug, Clone, Default)]
pub struct Symbol(Rc<SymbolData>);

impl Symbol {
    fn new(name: &str, kind: SymbolKind, defined_at: &Location) -> Self {
        let mut data = SymbolData::default();
        data.name = name.to_string();
        data.defined_at = defined_at.clone();
        let symbol = Self(Rc::new(data));
        symbol.0.kind.set(kind);
        symbol.0.id.set(-1);
        symbol.0.parser_id.set(-1);
        symbol.0.start_state.set(-1);
        symbol
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn defined_at(&self) -> &Location {
        &self.0.defined_at
    }

    pub fn used_at(&self) -> Vec<Location> {
        self.0.used_at.borrow().iter().cloned().collect()
    }

    pub fn add_used_at(&self, used_at: &Location) {
        self.0.used_at.borrow_mut().push(used_at.clone())
    }

    pub fn is_unused(&self) -> bool {
        self.0.used_at.borrow().is_empty()
    }

    pub fn kind(&self) -> SymbolKind {
        self.0.kind.get()
    }

    pub(crate) fn set_kind(&self, kind: SymbolKind) {
        self.0.kind.set(kind)
    }

    pub fn is_term(&self) -> bool {
        self.kind() == SymbolKind::Term
    }

    pub fn is_non_term(&self) -> bool {
        self.kind() == SymbolKind::NonTerm
    }

    pub fn id(&self) -> i64 {
        self.0.id.get()
    }

    pub(crate) fn set_id(&self, id: i64) {
        self.0.id.set(id)
    }

    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_user_term(&self) -> bool {
        self.0.is_user_term.get()
    }

    pub fn is_eof(&self) -> bool {
        self.0.is_eof.get()
    }

    pub(crate) fn set_is_eof(&self, value: bool) {
        self.0.is_eof.set(value)
    }

    pub fn is_ci(&self) -> bool {
        self.0.is_ci.get()
    }

    pub(crate) fn set_is_ci(&self, value: bool) {
        self.0.is_ci.set(value)
    }

    pub fn is_ignore(&self) -> bool {
        self.0.is_ignore.get()
    }

    pub fn set_is_ignore(&self, value: bool) {
        self.0.is_ignore.set(value)
    }

    pub fn is_literal(&self) -> bool {
        self.0.is_literal.get()
    }

    pub(crate) fn set_is_literal(&self, value: bool) {
        self.0.is_literal.set(value)
    }

    pub fn is_repeat(&self) -> bool {
        self.0.is_repeat.get()
    }

    pub(crate) fn set_is_repeat(&self, value: bool) {
        self.0.is_repeat.set(value)
    }

    pub fn is_list(&self) -> bool {
        self.0.is_list.get()
    }

    pub(crate) fn set_is_list(&self, value: bool) {
        self.0.is_list.set(value)
    }

    pub fn is_opt(&self) -> bool {
        self.0.is_opt.get()
    }

    pub(crate) fn set_is_opt(&self, value: bool) {
        self.0.is_opt.set(value)
    }

    pub fn parse_stop(&self) -> bool {
        self.0.parse_stop.get()
    }

    pub fn set_parse_stop(&self, value: bool) {
        self.0.parse_stop.set(value)
    }

    /// Shortest match ordering for this non terminal: the ordering pass
    /// records follow reductions before descending into the definitions.
    pub fn reduce_first(&self) -> bool {
        self.0.reduce_first.get()
    }

    pub fn set_reduce_first(&self, value: bool) {
        self.0.reduce_first.set(value)
    }

    pub fn no_pre_ignore(&self) -> bool {
        self.0.no_pre_ignore.get()
    }

    pub fn set_no_pre_ignore(&self, value: bool) {
        self.0.no_pre_ignore.set(value)
    }

    pub fn no_post_ignore(&self) -> bool {
        self.0.no_post_ignore.get()
    }

    pub fn set_no_post_ignore(&self, value: bool) {
        self.0.no_post_ignore.set(value)
    }

    pub fn pred_type(&self) -> PredType {
        self.0.pred_type.get()
    }

    pub fn pred_value(&self) -> i64 {
        self.0.pred_value.get()
    }

    pub fn set_pred(&self, pred_type: PredType, pred_value: i64) {
        self.0.pred_type.set(pred_type);
        self.0.pred_value.set(pred_value);
    }

    pub fn parser_id(&self) -> i64 {
        self.0.parser_id.get()
    }

    pub(crate) fn set_parser_id(&self, id: i64) {
        self.0.parser_id.set(id)
    }

    /// Index of this parser's entry state in the final graph.
    pub fn start_state(&self) -> i64 {
        self.0.start_state.get()
    }

    pub(crate) fn set_start_state(&self, state: i64) {
        self.0.start_state.set(state)
    }

    pub fn term_dup(&self) -> Option<Symbol> {
        self.0.term_dup.borrow().clone()
    }

    pub(crate) fn set_term_dup(&self, other: &Symbol) {
        *self.0.term_dup.borrow_mut() = Some(other.clone())
    }

    pub fn region(&self) -> Option<TokenRegion> {
        self.0.region.borrow().clone()
    }

    pub fn set_region(&self, region: &TokenRegion) {
        *self.0.region.borrow_mut() = Some(region.clone())
    }

    pub fn eof_lel(&self) -> Option<Symbol> {
        self.0.eof_lel.borrow().clone()
    }

    pub(crate) fn set_eof_lel(&self, eof: &Symbol) {
        *self.0.eof_lel.borrow_mut() = Some(eof.clone())
    }

    pub fn root_def(&self) -> Option<Production> {
        self.0.root_def.borrow().clone()
    }

    pub(crate) fn set_root_def(&self, production: &Production) {
        *self.0.root_def.borrow_mut() = Some(production.clone())
    }

    pub fn def_list(&self) -> Vec<Production> {
        self.0.def_list.borrow().clone()
    }

    pub fn def_list_len(&self) -> usize {
        self.0.def_list.borrow().len()
    }

    pub(crate) fn add_def(&self, production: &Production) {
        self.0.def_list.borrow_mut().push(production.clone())
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.name.partial_cmp(&other.0.name)
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

#[derive(Debug)]
pub enum SymbolError {
    DuplicateName(String),
    InvalidName(String),
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SymbolError::DuplicateName(name) => {
                write!(f, "\"{}\" is already defined", name)
            }
            SymbolError::InvalidName(name) => {
                write!(f, "\"{}\" is not an allowable symbol name", name)
            }
        }
    }
}

/// All of the language elements, in declaration order. Names beginning with
/// an underscore are reserved for the elements the builder synthesizes.
#[derive(Debug)]
pub struct SymbolTable {
    lang_els: Vec<Symbol>,
    by_name: BTreeMap<String, Symbol>,
    ptr_lel: Symbol,
    bool_lel: Symbol,
    int_lel: Symbol,
    str_lel: Symbol,
    stream_lel: Symbol,
    ignore_lel: Symbol,
    no_token_lel: Symbol,
    error_lel: Option<Symbol>,
    next_symbol_id: i64,
    first_non_term_id: i64,
}

impl Default for SymbolTable {
    fn default() -> Self {
        let mut table = Self {
            lang_els: Vec::new(),
            by_name: BTreeMap::new(),
            ptr_lel: Symbol::default(),
            bool_lel: Symbol::default(),
            int_lel: Symbol::default(),
            str_lel: Symbol::default(),
            stream_lel: Symbol::default(),
            ignore_lel: Symbol::default(),
            no_token_lel: Symbol::default(),
            error_lel: None,
            next_symbol_id: 0,
            first_non_term_id: 0,
        };
        // The built in terminals are declared first so that the first id
        // pass lands them on the runtime's fixed ids.
        table.ptr_lel = table.new_internal("_ptr", SymbolKind::Term);
        table.bool_lel = table.new_internal("_bool", SymbolKind::Term);
        table.int_lel = table.new_internal("_int", SymbolKind::Term);
        table.str_lel = table.new_internal("_str", SymbolKind::Term);
        table.stream_lel = table.new_internal("_stream", SymbolKind::Term);
        table.ignore_lel = table.new_internal("_ignore", SymbolKind::Term);
        table.no_token_lel = table.new_internal("_notoken", SymbolKind::Term);
        table
    }
}

impl SymbolTable {
    fn new_internal(&mut self, name: &str, kind: SymbolKind) -> Symbol {
        let symbol = Symbol::new(name, kind, &Location::default());
        self.lang_els.push(symbol.clone());
        self.by_name.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn check_name(&self, name: &str) -> Result<(), SymbolError> {
        if !NAME_CRE.is_match(name) {
            Err(SymbolError::InvalidName(name.to_string()))
        } else if self.by_name.contains_key(name) {
            Err(SymbolError::DuplicateName(name.to_string()))
        } else {
            Ok(())
        }
    }

    pub fn new_token(&mut self, name: &str, defined_at: &Location) -> Result<Symbol, SymbolError> {
        self.check_name(name)?;
        let symbol = Symbol::new(name, SymbolKind::Term, defined_at);
        self.lang_els.push(symbol.clone());
        self.by_name.insert(name.to_string(), symbol.clone());
        Ok(symbol)
    }

    pub fn new_non_terminal(
        &mut self,
        name: &str,
        defined_at: &Location,
    ) -> Result<Symbol, SymbolError> {
        if let Some(symbol) = self.by_name.get(name) {
            // An Unknown placeholder from an earlier use becomes defined.
            if symbol.kind() == SymbolKind::Unknown {
                symbol.set_kind(SymbolKind::NonTerm);
                return Ok(symbol.clone());
            }
            return Err(SymbolError::DuplicateName(name.to_string()));
        }
        self.check_name(name)?;
        let symbol = Symbol::new(name, SymbolKind::NonTerm, defined_at);
        self.lang_els.push(symbol.clone());
        self.by_name.insert(name.to_string(), symbol.clone());
        Ok(symbol)
    }

    /// Reference a symbol by name. An undeclared name yields an Unknown
    /// placeholder which must be defined before the build starts.
    pub fn use_symbol(&mut self, name: &str, used_at: &Location) -> Symbol {
        if let Some(symbol) = self.by_name.get(name) {
            symbol.add_used_at(used_at);
            return symbol.clone();
        }
        let symbol = Symbol::new(name, SymbolKind::Unknown, used_at);
        symbol.add_used_at(used_at);
        self.lang_els.push(symbol.clone());
        self.by_name.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name)
    }

    pub fn lang_els(&self) -> impl Iterator<Item = &Symbol> {
        self.lang_els.iter()
    }

    pub fn no_token_lel(&self) -> &Symbol {
        &self.no_token_lel
    }

    pub fn error_lel(&self) -> Option<&Symbol> {
        self.error_lel.as_ref()
    }

    pub fn new_error_token(&mut self) -> Symbol {
        if let Some(error_lel) = &self.error_lel {
            return error_lel.clone();
        }
        let symbol = self.new_internal("_error", SymbolKind::Term);
        self.error_lel = Some(symbol.clone());
        symbol
    }

    pub(crate) fn new_eof_token(&mut self, of: &str) -> Symbol {
        let symbol = self.new_internal(&format!("_eof_{}", of), SymbolKind::Term);
        symbol.set_is_eof(true);
        symbol
    }

    pub(crate) fn new_ci_token(&mut self, region_name: &str) -> Symbol {
        let symbol = self.new_internal(&format!("_ci_{}", region_name), SymbolKind::Term);
        symbol.set_is_ci(true);
        symbol
    }

    /// Register a synthesized non terminal after the id pass has already
    /// run; its id continues the non terminal range.
    pub(crate) fn new_late_non_terminal(&mut self, name: &str) -> Symbol {
        let symbol = self.new_internal(name, SymbolKind::NonTerm);
        symbol.set_id(self.next_symbol_id);
        self.next_symbol_id += 1;
        symbol
    }

    pub(crate) fn new_synthetic_non_terminal(&mut self, name: &str) -> Symbol {
        self.new_internal(name, SymbolKind::NonTerm)
    }

    pub fn next_symbol_id(&self) -> i64 {
        self.next_symbol_id
    }

    pub fn first_non_term_id(&self) -> i64 {
        self.first_non_term_id
    }

    /// Assign ids to every language element. Id 0 is reserved for the stack
    /// sentinel; a negative id tells the parsing function to backtrack.
    /// Terminals get the low range, then EOF terminals, then the no token
    /// terminal and the error terminal if present; everything else follows.
    pub(crate) fn make_lang_el_ids(&mut self) {
        let mut next_id = 1;

        for lel in self.lang_els.iter() {
            // Must be a term and not any of the special reserved terminals.
            if lel.kind() == SymbolKind::Term
                && !lel.is_eof()
                && !lel.same(&self.no_token_lel)
                && !self.error_lel.as_ref().map_or(false, |e| lel.same(e))
            {
                lel.0.is_user_term.set(true);
                lel.set_id(next_id);
                next_id += 1;
            }
        }

        for lel in self.lang_els.iter() {
            if lel.is_eof() {
                lel.set_id(next_id);
                next_id += 1;
            }
        }

        self.no_token_lel.set_id(next_id);
        next_id += 1;

        if let Some(error_lel) = &self.error_lel {
            error_lel.set_id(next_id);
            next_id += 1;
        }

        // Save this for the table generation.
        self.first_non_term_id = next_id;

        // Anything else not yet assigned gets assigned now.
        for lel in self.lang_els.iter() {
            if lel.id() < 0 {
                lel.set_id(next_id);
                next_id += 1;
            }
        }
        self.next_symbol_id = next_id;

        assert_eq!(self.ptr_lel.id(), LEL_ID_PTR);
        assert_eq!(self.bool_lel.id(), LEL_ID_BOOL);
        assert_eq!(self.int_lel.id(), LEL_ID_INT);
        assert_eq!(self.str_lel.id(), LEL_ID_STR);
        assert_eq!(self.stream_lel.id(), LEL_ID_STREAM);
        assert_eq!(self.ignore_lel.id(), LEL_ID_IGNORE);
    }

    /// Dense id to symbol index; index 0 is the stack sentinel.
    pub(crate) fn lang_el_index(&self) -> Vec<Option<Symbol>> {
        let mut index = vec![None; self.next_symbol_id as usize];
        for lel in self.lang_els.iter() {
            let id = lel.id();
            if id >= 0 {
                index[id as usize] = Some(lel.clone());
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_assignment_partitions() {
        let mut table = SymbolTable::default();
        let loc = Location::default();
        let a = table.new_token("a", &loc).unwrap();
        let b = table.new_token("b", &loc).unwrap();
        let x = table.new_non_terminal("x", &loc).unwrap();
        let eof = table.new_eof_token("x");
        table.make_lang_el_ids();

        assert_eq!(table.ptr_lel.id(), LEL_ID_PTR);
        assert_eq!(table.ignore_lel.id(), LEL_ID_IGNORE);
        assert_eq!(a.id(), 7);
        assert_eq!(b.id(), 8);
        assert!(a.is_user_term());
        // EOF ids come after the user terminals, then the no token element.
        assert_eq!(eof.id(), 9);
        assert!(!eof.is_user_term());
        assert_eq!(table.no_token_lel().id(), 10);
        assert_eq!(table.first_non_term_id(), 11);
        assert_eq!(x.id(), 11);
        assert_eq!(table.next_symbol_id(), 12);

        let index = table.lang_el_index();
        assert!(index[0].is_none());
        assert!(index[7].as_ref().unwrap().same(&a));
        assert!(index[11].as_ref().unwrap().same(&x));
    }

    #[test]
    fn error_token_precedes_non_terminals() {
        let mut table = SymbolTable::default();
        let loc = Location::default();
        let a = table.new_token("a", &loc).unwrap();
        let error_lel = table.new_error_token();
        let x = table.new_non_terminal("x", &loc).unwrap();
        table.make_lang_el_ids();
        assert_eq!(a.id(), 7);
        assert_eq!(table.no_token_lel().id(), 8);
        assert_eq!(error_lel.id(), 9);
        assert_eq!(table.first_non_term_id(), 10);
        assert_eq!(x.id(), 10);
    }

    #[test]
    fn name_rules() {
        let mut table = SymbolTable::default();
        let loc = Location::default();
        assert!(table.new_token("ok_name", &loc).is_ok());
        assert!(table.new_token("ok_name", &loc).is_err());
        assert!(table.new_token("_reserved", &loc).is_err());
        assert!(table.new_token("9bad", &loc).is_err());
    }

    #[test]
    fn unknown_placeholder_promotion() {
        let mut table = SymbolTable::default();
        let loc = Location::new("g", 1, 1);
        let used = table.use_symbol("thing", &loc);
        assert_eq!(used.kind(), SymbolKind::Unknown);
        let defined = table.new_non_terminal("thing", &loc).unwrap();
        assert!(used.same(&defined));
        assert_eq!(used.kind(), SymbolKind::NonTerm);
    }
}
