// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeSet;

use crate::error::BuildError;
use crate::grammar::Compiler;
use crate::pda::{ActionCode, PdaGraph, PdaTrans};
use crate::production::{Production, EPSILON};
use crate::symbol::{Symbol, SymbolKind};

/// Seed every transition's action list from its shift flag and reduction
/// map: the shift first with the transition's shift prior, then one reduce
/// per production with the reduction's priority. Orderings start at zero,
/// meaning unset.
pub(crate) fn seed_actions(graph: &mut PdaGraph) {
    for state in graph.states.iter_mut() {
        for trans in state.trans_map.values_mut() {
            if trans.is_shift {
                trans.actions.push(ActionCode::shift());
                trans.act_priors.push(trans.shift_prior);
            }
            for (&prod_id, &prior) in trans.reductions.iter() {
                trans.actions.push(ActionCode::reduce(prod_id));
                trans.act_priors.push(prior);
            }
            trans.act_ords = vec![0; trans.actions.len()];
        }
    }
}

/// Stamp the action's time if the action is present and not yet stamped.
fn try_set_time(trans: &mut PdaTrans, code: ActionCode, time: &mut i64) {
    for (index, action) in trans.actions.iter().enumerate() {
        if *action == code {
            if trans.act_ords[index] == 0 {
                trans.act_ords[index] = *time;
                *time += 1;
            }
            break;
        }
    }
}

impl Compiler {
    /// Assign every action a strictly increasing time by walking the
    /// grammar the way a canonical LR(1) parse would. The runtime explores
    /// conflicting actions in this order, so reductions that only exist
    /// because of LALR(1) state merging come out last and are only tried
    /// once the real alternatives are exhausted.
    pub(crate) fn pda_action_order(&self, graph: &mut PdaGraph) -> Vec<BuildError> {
        let mut errors = Vec::new();
        let mut time = 1;

        for parser_el in self.parser_els().iter() {
            let root_def = parser_el.root_def().expect("parsers are wrapped first");
            let eof_lel = parser_el.eof_lel().expect("parsers own an EOF terminal");
            {
                let fsm = root_def.fsm();
                let fsm = fsm.as_ref().expect("machine must be built first");
                self.order_prod(
                    graph,
                    &mut time,
                    parser_el,
                    parser_el.start_state() as usize,
                    fsm,
                    fsm.start_state,
                    &root_def,
                );
            }

            // The shift of the EOF that completes the parse.
            let over_start = graph.trans_target(parser_el.start_state() as usize, parser_el.id());
            let eof_trans = graph
                .find_trans_mut(over_start, eof_lel.id())
                .expect("the acceptance transition is always wired");
            eof_trans.act_ords[0] = time;
            time += 1;
        }

        // A state with no scan regions of its own but an EOF transition
        // scans in the EOF region.
        let eof_region = self.eof_token_region().clone();
        for index in 0..graph.states.len() {
            if !graph.states[index].regions.is_empty() {
                continue;
            }
            let has_eof = graph.states[index].trans_map.keys().any(|&key| {
                self.lang_el(key).map_or(false, |lel| lel.is_eof())
            });
            if has_eof {
                graph.states[index].regions.push(eof_region.clone());
            }
        }

        // Any action still without an ordering is a reduction the LALR(1)
        // merge invented; the runtime reaches it only after everything real
        // has failed. Stamp them with the times that are left.
        for (index, state) in graph.states.iter().enumerate() {
            if state.dot_set != state.dot_set2 {
                errors.push(BuildError::InternalOrderingGap {
                    state: index as i64,
                });
            }
        }
        for state in graph.states.iter_mut() {
            for trans in state.trans_map.values_mut() {
                for ord in trans.act_ords.iter_mut() {
                    if *ord == 0 {
                        *ord = time;
                        time += 1;
                    }
                }
            }
        }

        errors
    }

    /// Walk one production machine state in lockstep with the table. The
    /// dot coverage set doubles as the visit mark, which bounds the mutual
    /// recursion with `order_follow`.
    fn order_prod(
        &self,
        graph: &mut PdaGraph,
        time: &mut i64,
        root_el: &Symbol,
        tab_state: usize,
        src_fsm: &PdaGraph,
        src_state: usize,
        parent_def: &Production,
    ) {
        let dot = src_fsm.states[src_state].single_dot();
        if graph.states[tab_state].dot_set2.contains(&dot) {
            return;
        }
        graph.states[tab_state].dot_set2.insert(dot);

        debug_assert!(src_fsm.states[src_state].trans_map.len() <= 1);
        let (key, src_to_state) = match src_fsm.states[src_state].trans_map.values().next() {
            None => return,
            Some(trans) => (
                trans.key,
                trans.to_state.expect("production machines always shift"),
            ),
        };

        let lel = self.lang_el(key).cloned();
        if let Some(lel) = &lel {
            if lel.kind() == SymbolKind::NonTerm {
                let defs = lel.def_list();
                if lel.reduce_first() {
                    // Shortest match ordering for the contents of this non
                    // terminal: follows for all productions first, then down
                    // into the productions.
                    for exp_def in defs.iter() {
                        self.order_follow(
                            graph, time, root_el, tab_state, key, src_fsm, src_to_state,
                            parent_def, exp_def,
                        );
                    }
                    for exp_def in defs.iter() {
                        let fsm = exp_def.fsm();
                        let fsm = fsm.as_ref().expect("machine must be built first");
                        self.order_prod(graph, time, root_el, tab_state, fsm, fsm.start_state, exp_def);
                    }
                } else {
                    // The default ordering: down each production, then its
                    // follow, before moving to the next production.
                    for exp_def in defs.iter() {
                        {
                            let fsm = exp_def.fsm();
                            let fsm = fsm.as_ref().expect("machine must be built first");
                            self.order_prod(
                                graph,
                                time,
                                root_el,
                                tab_state,
                                fsm,
                                fsm.start_state,
                                exp_def,
                            );
                        }
                        self.order_follow(
                            graph, time, root_el, tab_state, key, src_fsm, src_to_state,
                            parent_def, exp_def,
                        );
                    }
                }
            }
        }

        {
            let trans = graph
                .find_trans_mut(tab_state, key)
                .expect("table transition matches the production machine");
            try_set_time(trans, ActionCode::shift(), time);
        }

        // Now possibly for the dup.
        if let Some(lel) = &lel {
            if let Some(dup) = lel.term_dup() {
                if let Some(trans) = graph.find_trans_mut(tab_state, dup.id()) {
                    try_set_time(trans, ActionCode::shift(), time);
                }
            }
        }

        self.add_region(graph, tab_state, key);

        let tab_to_state = graph.trans_target(tab_state, key);
        self.order_prod(
            graph,
            time,
            root_el,
            tab_to_state,
            src_fsm,
            src_to_state,
            parent_def,
        );
    }

    /// Stamp the reduce actions for one definition of the non terminal the
    /// production is currently crossing. The follow is taken over the table
    /// and the production machine in lockstep; the definition is then
    /// followed through the table to the state it expands to.
    fn order_follow(
        &self,
        graph: &mut PdaGraph,
        time: &mut i64,
        root_el: &Symbol,
        tab_state: usize,
        tab_key: i64,
        src_fsm: &PdaGraph,
        over_src: usize,
        parent_def: &Production,
        definition: &Production,
    ) {
        let mut alph_set: BTreeSet<i64> = BTreeSet::new();
        if parent_def.same(&root_el.root_def().expect("parsers are wrapped first")) {
            let eof_lel = root_el.eof_lel().expect("parsers own an EOF terminal");
            alph_set.insert(eof_lel.id());
        } else {
            let over_tab = graph.trans_target(tab_state, tab_key);
            self.find_follow(graph, &mut alph_set, over_tab, src_fsm, over_src, parent_def);
        }

        // Follow the definition to where it expands to.
        let expand_to_state = {
            let fsm = definition.fsm();
            let fsm = fsm.as_ref().expect("machine must be built first");
            self.follow_fsm(graph, tab_state, fsm)
        };

        let red_code = ActionCode::reduce(definition.prod_id());
        let keys: Vec<i64> = graph.states[expand_to_state]
            .trans_map
            .keys()
            .cloned()
            .collect();
        for key in keys {
            if alph_set.contains(&key) {
                try_set_time(
                    graph.find_trans_mut(expand_to_state, key).unwrap(),
                    red_code,
                    time,
                );
                self.add_region(graph, expand_to_state, key);
            }
        }
    }

    /// The first set over the remainder of the production; where the
    /// remainder can derive empty the walk moves over both machines and
    /// continues. At the end of the production the table takes over: the
    /// follow is exactly the terminals whose transitions carry the parent's
    /// reduce action.
    fn find_follow(
        &self,
        graph: &PdaGraph,
        result: &mut BTreeSet<i64>,
        over_tab: usize,
        src_fsm: &PdaGraph,
        over_src: usize,
        parent_def: &Production,
    ) {
        if src_fsm.states[over_src].trans_map.is_empty() {
            // At the end of the production. Turn to the table.
            let red_code = ActionCode::reduce(parent_def.prod_id());
            for (&key, trans) in graph.states[over_tab].trans_map.iter() {
                if trans.actions.contains(&red_code) {
                    result.insert(key);
                }
            }
            return;
        }

        debug_assert_eq!(src_fsm.states[over_src].trans_map.len(), 1);
        let (key, src_to_state) = {
            let trans = src_fsm.states[over_src].trans_map.values().next().unwrap();
            (
                trans.key,
                trans.to_state.expect("production machines always shift"),
            )
        };

        let lel = self.lang_el(key).cloned();
        match lel {
            Some(lel) if lel.kind() == SymbolKind::NonTerm => {
                let mut has_epsilon = false;
                for def in lel.def_list().iter() {
                    for &pid in def.first_set().iter() {
                        if pid == EPSILON {
                            has_epsilon = true;
                        } else {
                            result.insert(pid);
                        }
                    }
                }

                if has_epsilon {
                    let tab_to_state = graph.trans_target(over_tab, key);
                    self.find_follow(graph, result, tab_to_state, src_fsm, src_to_state, parent_def);
                }

                // Now possibly the dup.
                if let Some(dup) = lel.term_dup() {
                    result.insert(dup.id());
                }
            }
            _ => {
                result.insert(key);
            }
        }
    }

    /// Record the scan region the runtime needs when predicting the
    /// terminal on this transition, and the ignore collecting region of the
    /// state the shift leads to.
    pub(crate) fn add_region(&self, graph: &mut PdaGraph, tab_state: usize, key: i64) {
        let lel = match self.lang_el(key) {
            Some(lel) if lel.kind() == SymbolKind::Term => lel.clone(),
            _ => return,
        };
        if lel.is_eof() {
            return;
        }
        let region = match lel.region() {
            Some(region) => region,
            None => return,
        };

        let scan_region = if lel.no_pre_ignore() {
            region.token_only_region().unwrap_or_else(|| region.clone())
        } else {
            region.clone()
        };
        if !graph.states[tab_state]
            .regions
            .iter()
            .any(|r| r.same(&scan_region))
        {
            graph.states[tab_state].regions.push(scan_region);
        }

        if !lel.no_post_ignore() {
            if let Some(ignore_only) = region.ignore_only_region() {
                if let Some(to_state) = graph.states[tab_state].trans_map[&key].to_state {
                    if !graph.states[to_state]
                        .pre_regions
                        .iter()
                        .any(|r| r.same(&ignore_only))
                    {
                        graph.states[to_state].pre_regions.push(ignore_only);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::Compiler;
    use crate::production::ProdEl;

    #[test]
    fn every_action_gets_a_time_and_dots_are_covered() {
        // expr: expr plus expr | id;
        let mut cp = Compiler::new();
        let plus = cp.new_token("plus", None).unwrap();
        let id = cp.new_token("id", None).unwrap();
        let expr = cp.new_non_terminal("expr").unwrap();
        cp.new_production(
            &expr,
            &[ProdEl::new(&expr), ProdEl::new(&plus), ProdEl::new(&expr)],
        );
        cp.new_production(&expr, &[ProdEl::new(&id)]);
        cp.add_parser(&expr).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        for (_, state) in graph.live_states() {
            assert_eq!(state.dot_set, state.dot_set2);
            for trans in state.trans_map.values() {
                for &ord in trans.act_ords.iter() {
                    assert_ne!(ord, 0);
                }
            }
        }
    }

    #[test]
    fn times_are_unique_and_increasing() {
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(&item, &[ProdEl::new(&a), ProdEl::new(&b)]);
        cp.new_production(&item, &[ProdEl::new(&a)]);
        cp.add_parser(&item).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let mut seen = std::collections::BTreeSet::new();
        for (_, state) in graph.live_states() {
            for trans in state.trans_map.values() {
                for &ord in trans.act_ords.iter() {
                    assert!(seen.insert(ord), "duplicate time {}", ord);
                }
            }
        }
    }

    #[test]
    fn term_dup_is_stamped_alongside() {
        // item: a; with b registered as a's dup and reachable on its own
        // transition from the same state.
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        cp.pair_term_dup(&a, &b);
        let item = cp.new_non_terminal("item").unwrap();
        cp.new_production(&item, &[ProdEl::new(&a)]);
        cp.new_production(&item, &[ProdEl::new(&b)]);
        cp.add_parser(&item).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let start = item.start_state() as usize;
        let a_trans = graph.find_trans(start, a.id()).unwrap();
        let b_trans = graph.find_trans(start, b.id()).unwrap();
        // The dup's shift is stamped immediately after the original's.
        assert_eq!(a_trans.act_ords[0] + 1, b_trans.act_ords[0]);
    }
}
