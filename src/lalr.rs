// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::{BTreeMap, BTreeSet};

use crate::grammar::Compiler;
use crate::pda::PdaGraph;
use crate::production::{Production, EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessedState {
    Unprocessed,
    NeedsReprocessing,
    Processed,
}

/// Items of one state: dot item id to look ahead terminal set. The dot ids
/// are global, so a dot pins down both the production and the position.
type ItemSet = BTreeMap<i64, BTreeSet<i64>>;

impl Compiler {
    fn is_kernel_dot(&self, dot: i64) -> bool {
        let (prod, pos) = self.prod_of_dot(dot);
        pos > 0 || self.is_root_production(&prod)
    }

    fn kernel_dots(&self, items: &ItemSet) -> BTreeSet<i64> {
        items
            .keys()
            .cloned()
            .filter(|&dot| self.is_kernel_dot(dot))
            .collect()
    }

    /// First terminals of the remainder of a production from `pos`, with the
    /// parent look aheads appended when the remainder can derive empty.
    fn first_of_tail(&self, prod: &Production, pos: usize, look_ahead: &BTreeSet<i64>) -> BTreeSet<i64> {
        let mut result = BTreeSet::new();
        let fsm = prod.fsm();
        let fsm = fsm.as_ref().expect("machine must be built first");
        let mut state = pos;
        loop {
            let trans = match fsm.states[state].trans_map.values().next() {
                None => {
                    // Reached the end of the production.
                    result.extend(look_ahead.iter().cloned());
                    break;
                }
                Some(trans) => trans,
            };
            let key = trans.key;
            if key < self.first_non_term_id() {
                result.insert(key);
                break;
            }
            let lel = self.lang_el(key).expect("symbol ids are dense");
            let mut has_epsilon = false;
            for ldef in lel.def_list().iter() {
                for &pid in ldef.first_set().iter() {
                    if pid == EPSILON {
                        has_epsilon = true;
                    } else if pid < self.first_non_term_id() {
                        result.insert(pid);
                    }
                }
            }
            if !has_epsilon {
                break;
            }
            state = trans.to_state.expect("production machines always shift");
        }
        result
    }

    /// Close the item set: an item with the dot before a non terminal pulls
    /// in that non terminal's definitions, with look aheads from the first
    /// set of whatever follows. Returns true if anything was added.
    fn close_items(&self, items: &mut ItemSet) -> bool {
        let mut modified = false;
        let mut additions_made = true;
        while additions_made {
            additions_made = false;
            let snapshot: Vec<(i64, BTreeSet<i64>)> =
                items.iter().map(|(d, l)| (*d, l.clone())).collect();
            for (dot, look_ahead) in snapshot {
                let (prod, pos) = self.prod_of_dot(dot);
                let next_key = {
                    let fsm = prod.fsm();
                    let fsm = fsm.as_ref().expect("machine must be built first");
                    match fsm.states[pos].trans_map.values().next() {
                        Some(trans) => trans.key,
                        None => continue,
                    }
                };
                if next_key < self.first_non_term_id() {
                    continue;
                }
                let firsts = {
                    let fsm = prod.fsm();
                    let fsm = fsm.as_ref().expect("machine must be built first");
                    let over = fsm.states[pos]
                        .trans_map
                        .values()
                        .next()
                        .unwrap()
                        .to_state
                        .expect("production machines always shift");
                    self.first_of_tail(&prod, over, &look_ahead)
                };
                let lel = self.lang_el(next_key).expect("symbol ids are dense").clone();
                for ldef in lel.def_list().iter() {
                    let entry = items.entry(ldef.dot_base()).or_insert_with(BTreeSet::new);
                    let before = entry.len();
                    entry.extend(firsts.iter().cloned());
                    if entry.len() > before {
                        additions_made = true;
                        modified = true;
                    }
                }
            }
        }
        modified
    }

    /// Merge another closed item set into an existing state's items.
    fn merge_items(&self, items: &mut ItemSet, other: &ItemSet) -> bool {
        let mut modified = false;
        for (dot, look_ahead) in other.iter() {
            let entry = items.entry(*dot).or_insert_with(BTreeSet::new);
            let before = entry.len();
            entry.extend(look_ahead.iter().cloned());
            if entry.len() > before {
                modified = true;
            }
        }
        if self.close_items(items) {
            modified = true;
        }
        modified
    }

    /// The LALR(1) state construction. Builds one shared graph covering
    /// every registered parser: LR(1) item sets merged by kernel dot set,
    /// with look aheads unioned and affected states put back on the work
    /// list. Transitions come out keyed by symbol id in ascending order;
    /// each carries the shift flag, the shift prior and element commits
    /// merged from the production machines, and the reduction map for the
    /// reducible items at that look ahead.
    pub(crate) fn lalr1_generate_parser(&self, graph: &mut PdaGraph) {
        let mut items_by_state: Vec<ItemSet> = Vec::new();
        let mut processed: Vec<ProcessedState> = Vec::new();
        let mut kernel_map: BTreeMap<BTreeSet<i64>, usize> = BTreeMap::new();

        // Entry states, one per parser, rooted at the wrapper production
        // with the parser's EOF terminal as the look ahead.
        for parser_el in self.parser_els().iter() {
            let root_def = parser_el.root_def().expect("parsers are wrapped first");
            let eof_lel = parser_el.eof_lel().expect("parsers own an EOF terminal");
            let mut start_items = ItemSet::new();
            let mut look_ahead = BTreeSet::new();
            look_ahead.insert(eof_lel.id());
            start_items.insert(root_def.dot_base(), look_ahead);
            self.close_items(&mut start_items);

            let kernel = self.kernel_dots(&start_items);
            let state = match kernel_map.get(&kernel) {
                Some(&state) => {
                    self.merge_items(&mut items_by_state[state], &start_items);
                    state
                }
                None => {
                    let state = graph.add_state();
                    graph.states[state].dot_set = start_items.keys().cloned().collect();
                    items_by_state.push(start_items);
                    processed.push(ProcessedState::Unprocessed);
                    kernel_map.insert(kernel, state);
                    state
                }
            };
            parser_el.set_start_state(state as i64);
        }

        // Goto construction to a fixed point over the look aheads.
        loop {
            let state = match processed
                .iter()
                .position(|p| *p != ProcessedState::Processed)
            {
                Some(state) => state,
                None => break,
            };
            let first_time = processed[state] == ProcessedState::Unprocessed;
            processed[state] = ProcessedState::Processed;

            let mut goto_symbols: BTreeSet<i64> = BTreeSet::new();
            for &dot in items_by_state[state].keys() {
                let (prod, pos) = self.prod_of_dot(dot);
                let fsm = prod.fsm();
                let fsm = fsm.as_ref().expect("machine must be built first");
                if let Some(trans) = fsm.states[pos].trans_map.values().next() {
                    goto_symbols.insert(trans.key);
                }
            }

            for symbol_id in goto_symbols {
                let mut kernel_items = ItemSet::new();
                let mut shift_prior = 0;
                let mut commits: BTreeSet<i64> = BTreeSet::new();
                for (&dot, look_ahead) in items_by_state[state].iter() {
                    let (prod, pos) = self.prod_of_dot(dot);
                    let fsm = prod.fsm();
                    let fsm = fsm.as_ref().expect("machine must be built first");
                    if let Some(trans) = fsm.states[pos].trans_map.values().next() {
                        if trans.key == symbol_id {
                            kernel_items.insert(dot + 1, look_ahead.clone());
                            if trans.shift_prior > shift_prior {
                                shift_prior = trans.shift_prior;
                            }
                            commits.extend(trans.commits.iter().cloned());
                        }
                    }
                }
                let mut closed = kernel_items;
                self.close_items(&mut closed);
                let kernel = self.kernel_dots(&closed);

                let target = match kernel_map.get(&kernel) {
                    Some(&target) => {
                        let changed = self.merge_items(&mut items_by_state[target], &closed);
                        if changed && processed[target] == ProcessedState::Processed {
                            processed[target] = ProcessedState::NeedsReprocessing;
                        }
                        target
                    }
                    None => {
                        let target = graph.add_state();
                        graph.states[target].dot_set = closed.keys().cloned().collect();
                        items_by_state.push(closed);
                        processed.push(ProcessedState::Unprocessed);
                        kernel_map.insert(kernel, target);
                        target
                    }
                };

                if first_time {
                    let trans =
                        graph.append_new_trans(state, symbol_id, Some(target), true, shift_prior);
                    trans.commits.extend(commits.iter().cloned());
                }
            }
        }

        // Reductions: a final item reduces its production on each of its
        // look aheads. Pending commits of committed productions ride along.
        for state in 0..items_by_state.len() {
            for (&dot, look_ahead) in items_by_state[state].iter() {
                let (prod, pos) = self.prod_of_dot(dot);
                let (is_final, pending) = {
                    let fsm = prod.fsm();
                    let fsm = fsm.as_ref().expect("machine must be built first");
                    (
                        fsm.states[pos].is_final,
                        fsm.states[pos].pending_commits.clone(),
                    )
                };
                if !is_final {
                    continue;
                }
                for &la in look_ahead.iter() {
                    let trans = graph.find_or_new_trans(state, la);
                    let entry = trans.reductions.entry(prod.prod_id()).or_insert(0);
                    if prod.red_prior() > *entry {
                        *entry = prod.red_prior();
                    }
                    for &(_, length) in pending.iter() {
                        trans.commits.insert(length);
                    }
                }
            }
        }

        // Acceptance wiring: past each parser's wrapper production, the EOF
        // terminal shifts into a final state.
        for parser_el in self.parser_els().iter() {
            let root_def = parser_el.root_def().expect("parsers are wrapped first");
            let eof_lel = parser_el.eof_lel().expect("parsers own an EOF terminal");
            let over_start = {
                let fsm = root_def.fsm();
                let fsm = fsm.as_ref().expect("machine must be built first");
                self.follow_fsm(graph, parser_el.start_state() as usize, fsm)
            };
            let accept = graph.add_state();
            graph.set_fin_state(accept);
            {
                let trans = graph.find_or_new_trans(over_start, eof_lel.id());
                trans.is_shift = true;
            }
            graph.retarget_trans(over_start, eof_lel.id(), accept);
        }
    }

    /// Walk the table in lockstep with a production machine, returning the
    /// table state reached past the production's last element.
    pub(crate) fn follow_fsm(&self, graph: &PdaGraph, tab_state: usize, fsm: &PdaGraph) -> usize {
        let mut tab_state = tab_state;
        let mut prod_state = fsm.start_state;
        while let Some(trans) = fsm.states[prod_state].trans_map.values().next() {
            tab_state = graph.trans_target(tab_state, trans.key);
            prod_state = trans.to_state.expect("production machines always shift");
        }
        tab_state
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::Compiler;
    use crate::production::ProdEl;

    #[test]
    fn state_keys_ascend_and_shift_marks() {
        // item: a item | b;
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(&item, &[ProdEl::new(&a), ProdEl::new(&item)]);
        cp.new_production(&item, &[ProdEl::new(&b)]);
        cp.add_parser(&item).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        for (_, state) in graph.live_states() {
            let mut last = None;
            for (&key, trans) in state.trans_map.iter() {
                if let Some(last) = last {
                    assert!(key > last);
                }
                last = Some(key);
                assert_eq!(trans.key, key);
                if trans.to_state.is_some() {
                    assert!(trans.is_shift || !trans.actions.is_empty());
                }
            }
        }

        // The entry state shifts both terminals and the non terminal.
        let start = item.start_state() as usize;
        assert!(graph.find_trans(start, a.id()).unwrap().is_shift);
        assert!(graph.find_trans(start, b.id()).unwrap().is_shift);
        assert!(graph.find_trans(start, item.id()).unwrap().is_shift);
    }

    #[test]
    fn reductions_carry_look_aheads() {
        // pair: a b;
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let pair = cp.new_non_terminal("pair").unwrap();
        let prod = cp.new_production(&pair, &[ProdEl::new(&a), ProdEl::new(&b)]);
        cp.add_parser(&pair).unwrap();
        // Keep the reducing state alive for inspection.
        cp.set_advance_reductions_enabled(false);
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let eof = pair.eof_lel().unwrap();
        let start = pair.start_state() as usize;
        let after_a = graph.trans_target(start, a.id());
        let after_b = graph.trans_target(after_a, b.id());
        let eof_trans = graph.find_trans(after_b, eof.id()).unwrap();
        assert!(eof_trans.reductions.contains_key(&prod.prod_id()));
    }
}
