// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::io::{self, Write};

use log::warn;

use crate::error::{BuildError, BuildErrors, Location};
use crate::pda::PdaGraph;
use crate::production::{make_first_sets, make_non_term_first_sets, ProdEl, Production};
use crate::region::TokenRegion;
use crate::symbol::{PredType, Symbol, SymbolError, SymbolKind, SymbolTable};
use crate::tables::{make_pda_tables, PdaTables};

/// The whole build in one aggregate: the grammar as the frontend resolved
/// it, the shared graph and the finished tables. Passes run strictly one
/// after another; each leaves the invariants the next relies on.
pub struct Compiler {
    pub symbol_table: SymbolTable,
    productions: Vec<Production>,
    regions: Vec<TokenRegion>,
    parser_els: Vec<Symbol>,
    root_lel: Option<Symbol>,
    eof_token_region: TokenRegion,
    lel_index: Vec<Option<Symbol>>,
    dot_index: Vec<(i64, i64, usize)>,
    next_dot_id: i64,
    next_parser_id: i64,
    advance_reductions_enabled: bool,
    errors: Vec<BuildError>,
    pda_graph: Option<PdaGraph>,
    pda_tables: Option<PdaTables>,
}

impl Default for Compiler {
    fn default() -> Self {
        let eof_token_region = TokenRegion::new("_eof", 0);
        Self {
            symbol_table: SymbolTable::default(),
            productions: Vec::new(),
            regions: vec![eof_token_region.clone()],
            parser_els: Vec::new(),
            root_lel: None,
            eof_token_region,
            lel_index: Vec::new(),
            dot_index: Vec::new(),
            next_dot_id: 0,
            next_parser_id: 0,
            advance_reductions_enabled: true,
            errors: Vec::new(),
            pda_graph: None,
            pda_tables: None,
        }
    }
}

impl Compiler {
    pub fn new() -> Self {
        Compiler::default()
    }

    pub fn new_region(&mut self, name: &str) -> Result<TokenRegion, SymbolError> {
        if self.regions.iter().any(|r| r.name() == name) {
            return Err(SymbolError::DuplicateName(name.to_string()));
        }
        let region = TokenRegion::new(name, self.regions.len() as i64);
        self.regions.push(region.clone());
        Ok(region)
    }

    pub fn regions(&self) -> &[TokenRegion] {
        &self.regions
    }

    pub fn eof_token_region(&self) -> &TokenRegion {
        &self.eof_token_region
    }

    pub fn new_token(
        &mut self,
        name: &str,
        region: Option<&TokenRegion>,
    ) -> Result<Symbol, SymbolError> {
        let symbol = self.symbol_table.new_token(name, &Location::default())?;
        if let Some(region) = region {
            symbol.set_region(region);
        }
        Ok(symbol)
    }

    pub fn new_token_at(
        &mut self,
        name: &str,
        region: Option<&TokenRegion>,
        defined_at: &Location,
    ) -> Result<Symbol, SymbolError> {
        let symbol = self.symbol_table.new_token(name, defined_at)?;
        if let Some(region) = region {
            symbol.set_region(region);
        }
        Ok(symbol)
    }

    /// A literal token. When its text is the name of a token already
    /// declared the two share identity: each becomes the other's dup and
    /// the ordering pass stamps them in step.
    pub fn new_literal_token(
        &mut self,
        name: &str,
        text: &str,
        region: Option<&TokenRegion>,
    ) -> Result<Symbol, SymbolError> {
        let symbol = self.new_token(name, region)?;
        symbol.set_is_literal(true);
        if let Some(named) = self.symbol_table.get(text) {
            if named.is_term() && !named.same(&symbol) {
                let named = named.clone();
                self.pair_term_dup(&symbol, &named);
            }
        }
        Ok(symbol)
    }

    pub fn pair_term_dup(&mut self, a: &Symbol, b: &Symbol) {
        a.set_term_dup(b);
        b.set_term_dup(a);
    }

    pub fn new_error_token(&mut self) -> Symbol {
        self.symbol_table.new_error_token()
    }

    /// Synthesize the chained ignore terminal for a region. Productions
    /// that collect the region's ignores shift it as their first element;
    /// it scans in the region's ignore only companion when there is one.
    pub fn new_ci_token(&mut self, region: &TokenRegion) -> Symbol {
        if let Some(ci_lel) = region.ci_lel() {
            return ci_lel;
        }
        let symbol = self.symbol_table.new_ci_token(region.name());
        let scan_region = region.ignore_only_region().unwrap_or_else(|| region.clone());
        symbol.set_region(&scan_region);
        region.set_ci_lel(&symbol);
        symbol
    }

    pub fn new_non_terminal(&mut self, name: &str) -> Result<Symbol, SymbolError> {
        self.symbol_table.new_non_terminal(name, &Location::default())
    }

    pub fn use_symbol(&mut self, name: &str, used_at: &Location) -> Symbol {
        self.symbol_table.use_symbol(name, used_at)
    }

    /// `base?`: one production with the base symbol, one empty.
    pub fn new_opt(&mut self, base: &Symbol) -> Symbol {
        let lel = self
            .symbol_table
            .new_synthetic_non_terminal(&format!("_opt_{}", base.name()));
        lel.set_is_opt(true);
        self.new_production(&lel, &[ProdEl::new(base)]);
        self.new_production(&lel, &[]);
        lel
    }

    /// `base*`: right recursive repetition with an empty alternative.
    pub fn new_repeat(&mut self, base: &Symbol) -> Symbol {
        let lel = self
            .symbol_table
            .new_synthetic_non_terminal(&format!("_repeat_{}", base.name()));
        lel.set_is_repeat(true);
        self.new_production(&lel, &[ProdEl::new(base), ProdEl::new(&lel)]);
        self.new_production(&lel, &[]);
        lel
    }

    /// Separated list: one or more base symbols with the separator between.
    pub fn new_list(&mut self, base: &Symbol, sep: &Symbol) -> Symbol {
        let lel = self
            .symbol_table
            .new_synthetic_non_terminal(&format!("_list_{}", base.name()));
        lel.set_is_list(true);
        self.new_production(&lel, &[ProdEl::new(&lel), ProdEl::new(sep), ProdEl::new(base)]);
        self.new_production(&lel, &[ProdEl::new(base)]);
        lel
    }

    pub fn new_production(&mut self, lhs: &Symbol, rhs: &[ProdEl]) -> Production {
        self.new_production_at(lhs, rhs, &Location::default())
    }

    pub fn new_production_at(
        &mut self,
        lhs: &Symbol,
        rhs: &[ProdEl],
        defined_at: &Location,
    ) -> Production {
        let prod_id = self.productions.len() as i64;
        let prod_num = lhs.def_list_len() as i64;
        let production = Production::new(prod_id, prod_num, lhs.clone(), rhs.to_vec(), defined_at);
        lhs.add_def(&production);
        self.productions.push(production.clone());
        production
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn production(&self, prod_id: i64) -> &Production {
        &self.productions[prod_id as usize]
    }

    pub fn set_precedence(&mut self, pred_type: PredType, pred_value: i64, lang_els: &[&Symbol]) {
        for lang_el in lang_els.iter() {
            lang_el.set_pred(pred_type, pred_value);
        }
    }

    /// Register a parser entry point. The symbol gets its parser id and its
    /// paired EOF terminal here; the wrapper production comes later in the
    /// pipeline.
    pub fn add_parser(&mut self, lang_el: &Symbol) -> Result<(), SymbolError> {
        if lang_el.parser_id() >= 0 {
            return Err(SymbolError::DuplicateName(lang_el.name().to_string()));
        }
        lang_el.set_parser_id(self.next_parser_id);
        self.next_parser_id += 1;
        let eof_lel = self.symbol_table.new_eof_token(lang_el.name());
        lang_el.set_eof_lel(&eof_lel);
        self.parser_els.push(lang_el.clone());
        Ok(())
    }

    pub fn parser_els(&self) -> &[Symbol] {
        &self.parser_els
    }

    pub fn first_non_term_id(&self) -> i64 {
        self.symbol_table.first_non_term_id()
    }

    pub(crate) fn lang_el(&self, id: i64) -> Option<&Symbol> {
        self.lel_index.get(id as usize).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn lang_el_name(&self, id: i64) -> String {
        match self.lang_el(id) {
            Some(lel) => lel.name().to_string(),
            None => format!("#{}", id),
        }
    }

    pub(crate) fn prod_of_dot(&self, dot: i64) -> (Production, usize) {
        let position = self.dot_index.partition_point(|&(low, _, _)| low <= dot);
        debug_assert!(position > 0);
        let (low, high, index) = self.dot_index[position - 1];
        debug_assert!(dot >= low && dot <= high);
        (self.productions[index].clone(), (dot - low) as usize)
    }

    pub(crate) fn is_root_production(&self, production: &Production) -> bool {
        match &self.root_lel {
            Some(root_lel) => production.lhs().same(root_lel),
            None => false,
        }
    }

    pub fn advance_reductions_enabled(&self) -> bool {
        self.advance_reductions_enabled
    }

    /// Normally the builder folds every qualifying single reduction into
    /// its predecessors' shifts. Turning this off limits the rewrite to
    /// what parse stop parsers require.
    pub fn set_advance_reductions_enabled(&mut self, enabled: bool) {
        self.advance_reductions_enabled = enabled;
    }

    pub fn pda_graph(&self) -> Option<&PdaGraph> {
        self.pda_graph.as_ref()
    }

    pub fn pda_tables(&self) -> Option<&PdaTables> {
        self.pda_tables.as_ref()
    }

    fn check_errors(&mut self) -> Result<(), BuildErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BuildErrors(self.errors.drain(..).collect()))
        }
    }

    /// Make sure there are no language elements whose kind is unknown. This
    /// happens when an id is used on the rhs of a definition but is never
    /// defined as anything.
    fn no_undefined_lang_els(&mut self) {
        let mut errors = Vec::new();
        for lel in self.symbol_table.lang_els() {
            if lel.kind() == SymbolKind::Unknown {
                let mut used_at = lel.used_at();
                if used_at.is_empty() {
                    used_at.push(lel.defined_at().clone());
                }
                for location in used_at {
                    errors.push(BuildError::UndefinedSymbol {
                        name: lel.name().to_string(),
                        used_at: location,
                    });
                }
            }
        }
        self.errors.extend(errors);
    }

    fn warn_unused(&self) {
        let mut used: Vec<String> = Vec::new();
        for production in self.productions.iter() {
            for prod_el in production.rhs().iter() {
                used.push(prod_el.lang_el().name().to_string());
            }
        }
        for parser_el in self.parser_els.iter() {
            used.push(parser_el.name().to_string());
        }
        for lel in self.symbol_table.lang_els() {
            if lel.name().starts_with('_') {
                continue;
            }
            if !used.iter().any(|name| name == lel.name()) {
                warn!("\"{}\" is not used", lel.name());
            }
        }
    }

    /// Build the per production machines and number their dot items.
    fn make_prod_fsms(&mut self) {
        let prod_list = self.productions.clone();
        for (index, production) in prod_list.iter().enumerate() {
            production.build_fsm();
            let low = self.next_dot_id;
            let next = production.assign_dot_items(low);
            self.dot_index.push((low, next - 1, index));
            self.next_dot_id = next;
        }
    }

    /// Synthesize the root wrapper: a fresh non terminal with one
    /// production per registered parser, so any of them can drive the
    /// shared graph.
    fn wrap_parser_roots(&mut self) {
        let root_lel = self.symbol_table.new_late_non_terminal("_root");
        self.root_lel = Some(root_lel.clone());
        let parser_els = self.parser_els.clone();
        for parser_el in parser_els.iter() {
            let prod_id = self.productions.len() as i64;
            let prod_num = root_lel.def_list_len() as i64;
            let production = Production::new(
                prod_id,
                prod_num,
                root_lel.clone(),
                vec![ProdEl::new(parser_el)],
                &Location::default(),
            );
            root_lel.add_def(&production);
            parser_el.set_root_def(&production);
            let index = self.productions.len();
            self.productions.push(production.clone());

            production.build_fsm();
            let low = self.next_dot_id;
            let next = production.assign_dot_items(low);
            self.dot_index.push((low, next - 1, index));
            self.next_dot_id = next;
        }
        self.lel_index = self.symbol_table.lang_el_index();
    }

    /// The whole pipeline: ids, machines, first sets, root wrapping, state
    /// construction, the analysis passes and finally the flat tables. Every
    /// pass accumulates its errors and a pass with errors stops the build.
    pub fn build_parsers(&mut self) -> Result<(), BuildErrors> {
        self.warn_unused();
        self.no_undefined_lang_els();
        self.check_errors()?;

        self.symbol_table.make_lang_el_ids();
        self.lel_index = self.symbol_table.lang_el_index();

        self.make_prod_fsms();
        make_non_term_first_sets(&self.productions, &self.lel_index, self.first_non_term_id());
        make_first_sets(&self.productions, &self.lel_index, self.first_non_term_id());

        self.wrap_parser_roots();

        let mut graph = PdaGraph::new();
        self.lalr1_generate_parser(&mut graph);
        graph.set_state_numbers();

        crate::order::seed_actions(&mut graph);
        let errors = self.pda_action_order(&mut graph);
        self.errors.extend(errors);
        self.check_errors()?;

        let errors = self.sort_actions(&mut graph);
        self.errors.extend(errors);
        self.check_errors()?;

        self.resolve_precedence(&mut graph);

        self.compute_advance_reductions(&mut graph);
        let parser_els = self.parser_els.clone();
        for parser_el in parser_els.iter().filter(|p| p.parse_stop()) {
            self.mark_parse_stop_states(&mut graph, parser_el);
        }
        self.advance_reductions(&mut graph);
        graph.set_state_numbers();

        self.reduce_actions(&mut graph);

        // Transitions on non terminals carry exactly one action, a shift or
        // a shift reduce, and shift reduces never share a transition.
        if cfg!(debug_assertions) {
            for (_, state) in graph.live_states() {
                for (&key, trans) in state.trans_map.iter() {
                    if key >= self.first_non_term_id() {
                        debug_assert_eq!(trans.actions.len(), 1);
                        debug_assert!(
                            trans.actions[0].is_shift() || trans.actions[0].is_shift_reduce()
                        );
                    }
                    if trans.actions.iter().any(|a| a.is_shift_reduce()) {
                        debug_assert_eq!(trans.actions.len(), 1);
                    }
                }
            }
        }

        for parser_el in parser_els.iter().filter(|p| p.parse_stop()) {
            let errors = self.verify_parse_stop(&graph, parser_el);
            self.errors.extend(errors);
        }
        self.check_errors()?;

        self.pda_tables = Some(make_pda_tables(self, &graph));
        self.pda_graph = Some(graph);
        Ok(())
    }

    /// Dump the live states with their transitions and ordered actions.
    pub fn write_description<W: Write>(&self, wtr: &mut W) -> io::Result<()> {
        let graph = match &self.pda_graph {
            Some(graph) => graph,
            None => return Ok(()),
        };
        for production in self.productions.iter() {
            writeln!(wtr, "production {}: {}", production.prod_id(), production)?;
        }
        for (_, state) in graph.live_states() {
            writeln!(wtr, "state {}:", state.state_num)?;
            for (&key, trans) in state.trans_map.iter() {
                let actions: Vec<String> = trans.actions.iter().map(|a| a.to_string()).collect();
                match trans.to_state {
                    Some(to_state) => writeln!(
                        wtr,
                        "    {} -> {} [{}]",
                        self.lang_el_name(key),
                        graph.states[to_state].state_num,
                        actions.join(", ")
                    )?,
                    None => writeln!(
                        wtr,
                        "    {} [{}]",
                        self.lang_el_name(key),
                        actions.join(", ")
                    )?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pda::ActionCode;

    // expr: expr plus expr | expr times expr | id; with the usual
    // precedences. Returns the state reached after "expr plus expr".
    fn build_expression_grammar() -> (Compiler, Symbol, Symbol, Symbol, usize) {
        let mut cp = Compiler::new();
        let plus = cp.new_token("plus", None).unwrap();
        let times = cp.new_token("times", None).unwrap();
        let id = cp.new_token("id", None).unwrap();
        cp.set_precedence(PredType::Left, 1, &[&plus]);
        cp.set_precedence(PredType::Left, 2, &[&times]);
        let expr = cp.new_non_terminal("expr").unwrap();
        cp.new_production(
            &expr,
            &[ProdEl::new(&expr), ProdEl::new(&plus), ProdEl::new(&expr)],
        );
        cp.new_production(
            &expr,
            &[ProdEl::new(&expr), ProdEl::new(&times), ProdEl::new(&expr)],
        );
        cp.new_production(&expr, &[ProdEl::new(&id)]);
        cp.add_parser(&expr).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let start = expr.start_state() as usize;
        let over_expr = graph.trans_target(start, expr.id());
        let after_plus = graph.trans_target(over_expr, plus.id());
        let after_plus_expr = graph.trans_target(after_plus, expr.id());
        (cp, plus, times, id, after_plus_expr)
    }

    #[test]
    fn precedence_keeps_shift_of_stronger_operator() {
        let (cp, plus, times, _, after_plus_expr) = build_expression_grammar();
        let graph = cp.pda_graph().unwrap();

        // On the stronger operator only the shift survives.
        let times_trans = graph.find_trans(after_plus_expr, times.id()).unwrap();
        assert_eq!(times_trans.actions, vec![ActionCode::shift()]);

        // On the operator itself, left associativity keeps the reduction.
        let plus_trans = graph.find_trans(after_plus_expr, plus.id()).unwrap();
        assert_eq!(plus_trans.actions, vec![ActionCode::reduce(0)]);
    }

    #[test]
    fn nonassoc_removes_the_transition() {
        // expr: expr eq expr | id; with eq nonassoc.
        let mut cp = Compiler::new();
        let eq = cp.new_token("eq", None).unwrap();
        let id = cp.new_token("id", None).unwrap();
        cp.set_precedence(PredType::Nonassoc, 1, &[&eq]);
        let expr = cp.new_non_terminal("expr").unwrap();
        cp.new_production(
            &expr,
            &[ProdEl::new(&expr), ProdEl::new(&eq), ProdEl::new(&expr)],
        );
        cp.new_production(&expr, &[ProdEl::new(&id)]);
        cp.add_parser(&expr).unwrap();
        cp.set_advance_reductions_enabled(false);
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let start = expr.start_state() as usize;
        let over_expr = graph.trans_target(start, expr.id());
        let after_eq = graph.trans_target(over_expr, eq.id());
        let after_eq_expr = graph.trans_target(after_eq, expr.id());
        // Equal nonassoc precedence annihilates both actions and the
        // transition with them: "a eq b eq c" has nowhere to go.
        assert!(graph.find_trans(after_eq_expr, eq.id()).is_none());
    }

    #[test]
    fn region_attachment_honors_no_pre_ignore() {
        let mut cp = Compiler::new();
        let main = cp.new_region("main").unwrap();
        let token_only = cp.new_region("main_token_only").unwrap();
        let ignore_only = cp.new_region("main_ignore_only").unwrap();
        main.set_token_only_region(&token_only);
        main.set_ignore_only_region(&ignore_only);

        let t = cp.new_token("t", Some(&main)).unwrap();
        t.set_no_pre_ignore(true);
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(&item, &[ProdEl::new(&t)]);
        cp.add_parser(&item).unwrap();
        cp.set_advance_reductions_enabled(false);
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let start = item.start_state() as usize;
        let regions = &graph.states[start].regions;
        assert!(regions.iter().any(|r| r.same(&token_only)));
        assert!(!regions.iter().any(|r| r.same(&main)));

        // Post ignores are not suppressed, so the shifted to state collects
        // the region's ignores first.
        let after_t = graph.trans_target(start, t.id());
        assert!(graph.states[after_t]
            .pre_regions
            .iter()
            .any(|r| r.same(&ignore_only)));
    }

    #[test]
    fn parse_stop_incompatible_grammar_is_refused() {
        // item: a item | a; can only reduce at the EOF.
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(&item, &[ProdEl::new(&a), ProdEl::new(&item)]);
        cp.new_production(&item, &[ProdEl::new(&a)]);
        item.set_parse_stop(true);
        cp.add_parser(&item).unwrap();

        let errors = cp.build_parsers().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, BuildError::ParseStopIncompatible { .. })));
    }

    #[test]
    fn undefined_symbols_stop_the_build() {
        let mut cp = Compiler::new();
        let item = cp.new_non_terminal("item").unwrap();
        let mystery = cp.use_symbol("mystery", &Location::new("grammar", 4, 2));
        cp.new_production(&item, &[ProdEl::new(&mystery)]);
        cp.add_parser(&item).unwrap();

        let errors = cp.build_parsers().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, BuildError::UndefinedSymbol { name, .. } if name == "mystery")));
    }

    #[test]
    fn commit_lengths_reach_the_tables() {
        // item: a ! b; committing after the first element.
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(&item, &[ProdEl::new(&a), ProdEl::new(&b).with_commit()]);
        cp.add_parser(&item).unwrap();
        cp.set_advance_reductions_enabled(false);
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let tables = cp.pda_tables().unwrap();
        let start = item.start_state() as usize;
        let after_a = graph.trans_target(start, a.id());
        let state_num = graph.states[after_a].state_num;
        let (_, _, commit_len) = tables.lookup(state_num, b.id()).unwrap();
        // A commit before the shift is encoded with the sign flipped.
        assert_eq!(commit_len, -1);
    }

    #[test]
    fn opt_and_repeat_sugar() {
        // item: a_opt b_rep c;
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let c = cp.new_token("c", None).unwrap();
        let a_opt = cp.new_opt(&a);
        let b_rep = cp.new_repeat(&b);
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(
            &item,
            &[ProdEl::new(&a_opt), ProdEl::new(&b_rep), ProdEl::new(&c)],
        );
        cp.add_parser(&item).unwrap();
        cp.build_parsers().unwrap();

        assert!(a_opt.is_opt());
        assert!(b_rep.is_repeat());
        // The empty alternative of the option can begin with anything the
        // rest of the production can.
        let opt_defs = a_opt.def_list();
        assert!(opt_defs[1].first_set().contains(&crate::production::EPSILON));

        let graph = cp.pda_graph().unwrap();
        for (_, state) in graph.live_states() {
            assert_eq!(state.dot_set, state.dot_set2);
        }
    }

    #[test]
    fn collect_ignore_region_prepends_a_transition() {
        let mut cp = Compiler::new();
        let main = cp.new_region("main").unwrap();
        let ignore_only = cp.new_region("main_ignore_only").unwrap();
        main.set_ignore_only_region(&ignore_only);
        let ci = cp.new_ci_token(&main);

        let t = cp.new_token("t", Some(&main)).unwrap();
        let item = cp.new_non_terminal("item").unwrap();
        let prod = cp.new_production(&item, &[ProdEl::new(&t)]);
        prod.set_collect_ignore_region(&main);
        cp.add_parser(&item).unwrap();
        cp.build_parsers().unwrap();

        // The machine gained a leading transition on the chained ignore
        // terminal, and the production length counts it.
        assert_eq!(prod.fsm_length(), 2);
        {
            let fsm = prod.fsm();
            let fsm = fsm.as_ref().unwrap();
            assert!(fsm.find_trans(0, ci.id()).is_some());
        }

        let graph = cp.pda_graph().unwrap();
        let start = item.start_state() as usize;
        assert!(graph.find_trans(start, ci.id()).unwrap().is_shift);
        // The chained ignore terminal scans in the ignore only companion.
        assert!(graph.states[start]
            .regions
            .iter()
            .any(|r| r.same(&ignore_only)));
    }

    #[test]
    fn reduce_first_orders_follows_before_descending() {
        // item: rep b; rep: a rep | <empty>; with shortest match on rep the
        // empty reduction is timed ahead of the descent into "a rep".
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let rep = cp.new_non_terminal("rep").unwrap();
        rep.set_reduce_first(true);
        cp.new_production(&rep, &[ProdEl::new(&a), ProdEl::new(&rep)]);
        let empty = cp.new_production(&rep, &[]);
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(&item, &[ProdEl::new(&rep), ProdEl::new(&b)]);
        cp.add_parser(&item).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let start = item.start_state() as usize;
        let a_trans = graph.find_trans(start, a.id()).unwrap();
        let a_shift_position = a_trans
            .actions
            .iter()
            .position(|action| action.is_shift())
            .unwrap();
        let a_shift_ord = a_trans.act_ords[a_shift_position];
        let b_trans = graph.find_trans(start, b.id()).unwrap();
        let red_code = ActionCode::reduce(empty.prod_id());
        let b_red_position = b_trans
            .actions
            .iter()
            .position(|action| *action == red_code)
            .unwrap();
        let b_red_ord = b_trans.act_ords[b_red_position];
        assert!(
            b_red_ord < a_shift_ord,
            "shortest match tries the empty reduction first"
        );
    }

    #[test]
    fn two_parsers_share_one_graph() {
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let one = cp.new_non_terminal("one").unwrap();
        let two = cp.new_non_terminal("two").unwrap();
        cp.new_production(&one, &[ProdEl::new(&a)]);
        cp.new_production(&two, &[ProdEl::new(&one), ProdEl::new(&b)]);
        cp.add_parser(&one).unwrap();
        cp.add_parser(&two).unwrap();
        assert!(cp.add_parser(&two).is_err());
        cp.build_parsers().unwrap();

        let tables = cp.pda_tables().unwrap();
        assert_eq!(tables.start_states.len(), 2);
        assert_ne!(tables.start_states[0], tables.start_states[1]);
        assert_ne!(tables.eof_lel_ids[0], tables.eof_lel_ids[1]);
        assert_eq!(tables.parser_lel_ids, vec![one.id(), two.id()]);

        // The ordering walk of either parser covers the states they share.
        let graph = cp.pda_graph().unwrap();
        for (_, state) in graph.live_states() {
            assert_eq!(state.dot_set, state.dot_set2);
        }
    }

    #[test]
    fn description_dump_names_the_transitions() {
        let mut cp = Compiler::new();
        let b = cp.new_token("b", None).unwrap();
        let line = cp.new_non_terminal("line").unwrap();
        cp.new_production(&line, &[ProdEl::new(&b)]);
        cp.add_parser(&line).unwrap();
        cp.build_parsers().unwrap();

        let mut text = Vec::new();
        cp.write_description(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("state 0:"));
        assert!(text.contains("b"));
        assert!(text.contains("production 0: line: b"));
    }
}
