// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::BTreeSet;

use log::info;

use crate::error::BuildError;
use crate::grammar::Compiler;
use crate::pda::{ActionCode, PdaGraph};
use crate::symbol::{PredType, Symbol};

impl Compiler {
    /// Sort each transition's actions by (priority descending, time
    /// ascending) and report the branch points: transitions left with more
    /// than one action, which the runtime explores in the stored order and
    /// backtracks across. Transitions on non terminals must come out as a
    /// single shift with no commits.
    pub(crate) fn sort_actions(&self, graph: &mut PdaGraph) -> Vec<BuildError> {
        let mut errors = Vec::new();
        for index in 0..graph.states.len() {
            if graph.states[index].dead {
                continue;
            }
            debug_assert_eq!(graph.states[index].dot_set, graph.states[index].dot_set2);
            let state_num = graph.states[index].state_num;
            let keys: Vec<i64> = graph.states[index].trans_map.keys().cloned().collect();
            for key in keys {
                let trans = graph.find_trans_mut(index, key).unwrap();

                // Selection by highest priority, then earliest time.
                let mut actions = Vec::with_capacity(trans.actions.len());
                let mut act_ords = Vec::with_capacity(trans.actions.len());
                let mut act_priors = Vec::with_capacity(trans.actions.len());
                while !trans.actions.is_empty() {
                    let mut min = 0;
                    for i in 1..trans.actions.len() {
                        if trans.act_priors[i] > trans.act_priors[min]
                            || (trans.act_priors[i] == trans.act_priors[min]
                                && trans.act_ords[i] < trans.act_ords[min])
                        {
                            min = i;
                        }
                    }
                    actions.push(trans.actions.remove(min));
                    act_ords.push(trans.act_ords.remove(min));
                    act_priors.push(trans.act_priors.remove(min));
                }
                trans.actions = actions;
                trans.act_ords = act_ords;
                trans.act_priors = act_priors;

                if trans.actions.len() > 1 {
                    let listing: Vec<String> =
                        trans.actions.iter().map(|a| a.to_string()).collect();
                    info!(
                        "branch point state: {} trans: {}: {}",
                        state_num,
                        self.lang_el_name(key),
                        listing.join(", ")
                    );
                }

                if key >= self.first_non_term_id() {
                    let trans = graph.find_trans(index, key).unwrap();
                    if trans.actions.len() != 1 || !trans.actions[0].is_shift() {
                        errors.push(BuildError::NonTermTransitionNotSingleShift {
                            state: state_num,
                            symbol: self.lang_el_name(key),
                        });
                    }
                    if !trans.commits.is_empty() {
                        errors.push(BuildError::CommitOnNonTermTransition {
                            state: state_num,
                            symbol: self.lang_el_name(key),
                        });
                    }
                }
            }
        }
        errors
    }

    fn pred_of_action(&self, key: i64, action: ActionCode) -> Option<Symbol> {
        if action.is_shift() {
            self.lang_el(key).cloned()
        } else {
            self.production(action.prod_id()).pred_of()
        }
    }

    /// Pairwise conflict resolution from the declared precedences. The
    /// winner bubbles to the front, the loser is dropped; a nonassoc pair
    /// at equal precedence annihilates, and a transition left with no
    /// actions at all disappears.
    pub(crate) fn resolve_precedence(&self, graph: &mut PdaGraph) {
        for index in 0..graph.states.len() {
            if graph.states[index].dead {
                continue;
            }
            let keys: Vec<i64> = graph.states[index].trans_map.keys().cloned().collect();
            for key in keys {
                'again: loop {
                    let (swap_at, remove_both) = {
                        let trans = graph.find_trans(index, key).unwrap();
                        let mut found = None;
                        'scan: for i in 0..trans.actions.len() {
                            let li = match self.pred_of_action(key, trans.actions[i]) {
                                Some(lel) if lel.pred_type() != PredType::None => lel,
                                _ => continue,
                            };
                            for j in i + 1..trans.actions.len() {
                                let lj = match self.pred_of_action(key, trans.actions[j]) {
                                    Some(lel) if lel.pred_type() != PredType::None => lel,
                                    _ => continue,
                                };
                                let swap = precedence_swap(
                                    trans.actions[i],
                                    trans.actions[j],
                                    &li,
                                    &lj,
                                );
                                let remove_both = precedence_remove_both(&li, &lj);
                                found = Some(((i, j), swap, remove_both));
                                break 'scan;
                            }
                        }
                        match found {
                            None => break 'again,
                            Some(((i, j), swap, remove_both)) => {
                                let trans = graph.find_trans_mut(index, key).unwrap();
                                if swap {
                                    trans.actions.swap(i, j);
                                    trans.act_ords.swap(i, j);
                                    trans.act_priors.swap(i, j);
                                }
                                trans.actions.remove(j);
                                trans.act_ords.remove(j);
                                trans.act_priors.remove(j);
                                (i, remove_both)
                            }
                        }
                    };
                    if remove_both {
                        let trans = graph.find_trans_mut(index, key).unwrap();
                        trans.actions.remove(swap_at);
                        trans.act_ords.remove(swap_at);
                        trans.act_priors.remove(swap_at);
                    }
                }
                // If nothing is left (nonassoc), remove the transition.
                if graph.find_trans(index, key).unwrap().actions.is_empty() {
                    graph.remove_trans(index, key);
                }
            }
        }
    }

    /// Flag the states whose single reduction can be folded into their
    /// predecessors' shifts.
    pub(crate) fn compute_advance_reductions(&self, graph: &mut PdaGraph) {
        if !self.advance_reductions_enabled() {
            return;
        }
        for state in graph.states.iter_mut() {
            if state.dead {
                continue;
            }
            let mut out_has_shift = false;
            let mut out_reds: BTreeSet<i64> = BTreeSet::new();
            for trans in state.trans_map.values() {
                if trans.is_shift {
                    out_has_shift = true;
                }
                out_reds.extend(trans.reductions.keys().cloned());
            }
            if !out_has_shift && out_reds.len() == 1 {
                state.advance_reductions = true;
            }
        }
    }

    /// For a parse stop parser every state still depending on the EOF to
    /// reduce must have its reduction advanced, so flag them all.
    pub(crate) fn mark_parse_stop_states(&self, graph: &mut PdaGraph, parser_el: &Symbol) {
        let root_def = parser_el.root_def().expect("parsers are wrapped first");
        let eof_lel = parser_el.eof_lel().expect("parsers own an EOF terminal");
        let over_start = {
            let fsm = root_def.fsm();
            let fsm = fsm.as_ref().expect("machine must be built first");
            self.follow_fsm(graph, parser_el.start_state() as usize, fsm)
        };
        for index in 0..graph.states.len() {
            if index == over_start || graph.states[index].dead {
                continue;
            }
            if graph.states[index].trans_map.contains_key(&eof_lel.id()) {
                graph.states[index].advance_reductions = true;
            }
        }
    }

    /// Rewrite the flagged states that qualify: no shifts out, exactly one
    /// distinct reduction out, every incoming transition a plain shift. The
    /// incoming shifts become shift reduces, the state's outgoing
    /// transitions are dropped and its incoming transitions are parked on a
    /// sink state; whatever became unreachable is swept.
    pub(crate) fn advance_reductions(&self, graph: &mut PdaGraph) {
        let mut action_dest_state = None;
        for index in 0..graph.states.len() {
            if graph.states[index].dead || !graph.states[index].advance_reductions {
                continue;
            }

            let mut out_has_shift = false;
            let mut out_reds: BTreeSet<i64> = BTreeSet::new();
            let mut out_commits: BTreeSet<i64> = BTreeSet::new();
            for trans in graph.states[index].trans_map.values() {
                if trans.is_shift {
                    out_has_shift = true;
                }
                out_reds.extend(trans.reductions.keys().cloned());
                out_commits.extend(trans.commits.iter().cloned());
            }

            let mut in_has_shift = false;
            let mut in_has_reds = false;
            for &(from, key) in graph.states[index].in_range.iter() {
                let trans = graph.find_trans(from, key).unwrap();
                if trans.is_shift {
                    in_has_shift = true;
                }
                if !trans.reductions.is_empty() {
                    in_has_reds = true;
                }
            }

            if out_has_shift || out_reds.len() != 1 || !in_has_shift || in_has_reds {
                continue;
            }
            let red_prod = *out_reds.iter().next().unwrap();

            // Move the reduction to all in transitions.
            let in_range: Vec<(usize, i64)> = graph.states[index].in_range.clone();
            for (from, key) in in_range {
                let trans = graph.find_trans_mut(from, key).unwrap();
                debug_assert_eq!(trans.actions.len(), 1);
                debug_assert!(trans.actions[0].is_shift());
                trans.actions[0] = ActionCode::shift_reduce(red_prod);
                trans.after_shift_commits.extend(out_commits.iter().cloned());
            }

            // Remove all transitions out of the state and park the in
            // transitions on the sink.
            let keys: Vec<i64> = graph.states[index].trans_map.keys().cloned().collect();
            for key in keys {
                graph.remove_trans(index, key);
            }
            let dest = match action_dest_state {
                Some(dest) => dest,
                None => {
                    let dest = graph.add_state();
                    action_dest_state = Some(dest);
                    dest
                }
            };
            graph.in_trans_move(dest, index);
        }

        let entries: Vec<usize> = self
            .parser_els()
            .iter()
            .map(|p| p.start_state() as usize)
            .collect();
        graph.remove_unreachable_states(&entries);
    }

    /// After the rewrite a parse stop grammar may not reach the EOF
    /// anywhere except past the root.
    pub(crate) fn verify_parse_stop(&self, graph: &PdaGraph, parser_el: &Symbol) -> Vec<BuildError> {
        let root_def = parser_el.root_def().expect("parsers are wrapped first");
        let eof_lel = parser_el.eof_lel().expect("parsers own an EOF terminal");
        let over_start = {
            let fsm = root_def.fsm();
            let fsm = fsm.as_ref().expect("machine must be built first");
            self.follow_fsm(graph, parser_el.start_state() as usize, fsm)
        };
        for (index, state) in graph.live_states() {
            if index == over_start {
                continue;
            }
            if state.trans_map.contains_key(&eof_lel.id()) {
                return vec![BuildError::ParseStopIncompatible {
                    parser: parser_el.name().to_string(),
                }];
            }
        }
        Vec::new()
    }

    /// Fold each transition's commits into a single signed length and
    /// intern the (target, actions, commit length) triple. The sign says
    /// whether the commit applies before or after the shift.
    pub(crate) fn reduce_actions(&self, graph: &mut PdaGraph) {
        for index in 0..graph.states.len() {
            if graph.states[index].dead {
                continue;
            }
            let keys: Vec<i64> = graph.states[index].trans_map.keys().cloned().collect();
            for key in keys {
                let (targ, actions, commit_len) = {
                    let trans = graph.find_trans(index, key).unwrap();
                    let commit = trans.commits.iter().next_back().cloned().unwrap_or(0);
                    let commit_len = match trans.after_shift_commits.iter().next_back() {
                        Some(&after_shift_commit) => {
                            if commit > 0 && commit + 1 > after_shift_commit {
                                commit + 1
                            } else {
                                after_shift_commit
                            }
                        }
                        None => -commit,
                    };
                    let targ = trans
                        .to_state
                        .map(|to| graph.states[to].state_num)
                        .unwrap_or(0);
                    (targ, trans.actions.clone(), commit_len)
                };
                let el = graph.insert_action_set(targ, &actions, commit_len);
                graph.find_trans_mut(index, key).unwrap().action_set = Some(el);
            }
        }
    }
}

fn precedence_swap(action1: ActionCode, action2: ActionCode, l1: &Symbol, l2: &Symbol) -> bool {
    if l2.pred_value() > l1.pred_value() {
        true
    } else if l1.pred_value() == l2.pred_value() {
        if l1.pred_type() == PredType::Left && action1.is_shift() {
            true
        } else {
            l1.pred_type() == PredType::Right && action2.is_shift()
        }
    } else {
        false
    }
}

fn precedence_remove_both(l1: &Symbol, l2: &Symbol) -> bool {
    l1.pred_value() == l2.pred_value()
        && l1.pred_type() == PredType::Nonassoc
        && l2.pred_type() == PredType::Nonassoc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Compiler;
    use crate::production::ProdEl;

    #[test]
    fn swap_rules() {
        let mut cp = Compiler::new();
        let plus = cp.new_token("plus", None).unwrap();
        let times = cp.new_token("times", None).unwrap();
        plus.set_pred(PredType::Left, 1);
        times.set_pred(PredType::Left, 2);
        let shift = ActionCode::shift();
        let reduce = ActionCode::reduce(0);
        // Reduce with lower precedence loses its spot to the shift.
        assert!(precedence_swap(reduce, shift, &plus, &times));
        // Equal precedence, left associative: the shift yields.
        assert!(precedence_swap(shift, reduce, &plus, &plus));
        assert!(!precedence_swap(reduce, shift, &plus, &plus));
    }

    #[test]
    fn shift_reduce_merging() {
        // pair: x y; the state reducing pair after shifting y folds into
        // its predecessor as a shift reduce.
        let mut cp = Compiler::new();
        let x = cp.new_token("x", None).unwrap();
        let y = cp.new_token("y", None).unwrap();
        let pair = cp.new_non_terminal("pair").unwrap();
        let prod = cp.new_production(&pair, &[ProdEl::new(&x), ProdEl::new(&y)]);
        cp.add_parser(&pair).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let start = pair.start_state() as usize;
        let after_x = graph.trans_target(start, x.id());
        let y_trans = graph.find_trans(after_x, y.id()).unwrap();
        assert_eq!(y_trans.actions.len(), 1);
        assert!(y_trans.actions[0].is_shift_reduce());
        assert_eq!(y_trans.actions[0].prod_id(), prod.prod_id());

        // No live state carries the plain reduction any more.
        for (_, state) in graph.live_states() {
            for trans in state.trans_map.values() {
                for action in trans.actions.iter() {
                    assert!(!(action.is_reduce() && action.prod_id() == prod.prod_id()));
                }
            }
        }
    }

    #[test]
    fn shift_reduce_actions_stand_alone() {
        let mut cp = Compiler::new();
        let x = cp.new_token("x", None).unwrap();
        let y = cp.new_token("y", None).unwrap();
        let pair = cp.new_non_terminal("pair").unwrap();
        cp.new_production(&pair, &[ProdEl::new(&x), ProdEl::new(&y)]);
        cp.add_parser(&pair).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        for (_, state) in graph.live_states() {
            for trans in state.trans_map.values() {
                if trans.actions.iter().any(|a| a.is_shift_reduce()) {
                    assert_eq!(trans.actions.len(), 1);
                }
                if trans.key >= cp.first_non_term_id() {
                    assert_eq!(trans.actions.len(), 1);
                    assert!(trans.actions[0].is_shift() || trans.actions[0].is_shift_reduce());
                    assert!(trans.commits.is_empty());
                }
            }
        }
    }
}
