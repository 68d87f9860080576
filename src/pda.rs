// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::region::TokenRegion;

pub const SHIFT_CODE: i64 = 1;
pub const REDUCE_CODE: i64 = 2;
pub const SHIFT_REDUCE_CODE: i64 = 3;

/// A packed parse action. The low two bits are the tag (1 shift, 2 reduce,
/// 3 shift reduce); the remaining bits carry the production id for the
/// reducing forms. The packing is part of the runtime ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActionCode(i64);

impl ActionCode {
    pub fn shift() -> Self {
        ActionCode(SHIFT_CODE)
    }

    pub fn reduce(prod_id: i64) -> Self {
        ActionCode((prod_id << 2) | REDUCE_CODE)
    }

    pub fn shift_reduce(prod_id: i64) -> Self {
        ActionCode((prod_id << 2) | SHIFT_REDUCE_CODE)
    }

    pub fn tag(self) -> i64 {
        self.0 & 0x3
    }

    pub fn prod_id(self) -> i64 {
        self.0 >> 2
    }

    pub fn is_shift(self) -> bool {
        self.0 == SHIFT_CODE
    }

    pub fn is_reduce(self) -> bool {
        self.tag() == REDUCE_CODE
    }

    pub fn is_shift_reduce(self) -> bool {
        self.tag() == SHIFT_REDUCE_CODE
    }

    pub fn code(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.tag() {
            SHIFT_CODE => write!(f, "shift"),
            REDUCE_CODE => write!(f, "reduce({})", self.prod_id()),
            SHIFT_REDUCE_CODE => write!(f, "shift-reduce({})", self.prod_id()),
            _ => write!(f, "invalid({})", self.0),
        }
    }
}

/// A transition keyed by a single symbol id. Carries the shift flag and
/// the reduction set from state construction, then the ordered action list
/// once the analysis passes have run.
#[derive(Debug, Clone, Default)]
pub struct PdaTrans {
    pub key: i64,
    pub to_state: Option<usize>,
    pub is_shift: bool,
    pub shift_prior: i64,
    /// Production id to reduction priority.
    pub reductions: BTreeMap<i64, i64>,
    pub commits: BTreeSet<i64>,
    pub after_shift_commits: BTreeSet<i64>,
    pub actions: Vec<ActionCode>,
    pub act_ords: Vec<i64>,
    pub act_priors: Vec<i64>,
    pub action_set: Option<usize>,
}

impl PdaTrans {
    pub fn new(key: i64) -> Self {
        let mut trans = PdaTrans::default();
        trans.key = key;
        trans
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdaState {
    pub state_num: i64,
    pub trans_map: BTreeMap<i64, PdaTrans>,
    /// Incoming transitions as (from state, key) pairs.
    pub in_range: Vec<(usize, i64)>,
    pub dot_set: BTreeSet<i64>,
    pub dot_set2: BTreeSet<i64>,
    pub regions: Vec<TokenRegion>,
    pub pre_regions: Vec<TokenRegion>,
    /// (production id, production length) pairs carried on the final states
    /// of committed productions; folded onto reducing transitions during
    /// state construction.
    pub pending_commits: Vec<(i64, i64)>,
    pub advance_reductions: bool,
    pub is_final: bool,
    pub dead: bool,
}

impl PdaState {
    pub fn new() -> Self {
        let mut state = PdaState::default();
        state.state_num = -1;
        state
    }

    pub fn single_dot(&self) -> i64 {
        debug_assert_eq!(self.dot_set.len(), 1);
        *self.dot_set.iter().next().expect("state has no dot item")
    }
}

/// The deduplication bucket over (target state, action run, commit length).
#[derive(Debug, Clone)]
pub struct ActionSetEl {
    pub id: i64,
    pub targ: i64,
    pub actions: Vec<ActionCode>,
    pub commit_len: i64,
}

/// A push down automaton graph. Owns its states exclusively; every cross
/// reference is a stable index into the state vector. Removal tombstones
/// the slot (`dead`) and renumbering skips the tombstones, so indices held
/// elsewhere stay valid for the whole build.
#[derive(Debug, Default)]
pub struct PdaGraph {
    pub states: Vec<PdaState>,
    pub start_state: usize,
    pub fin_state_set: BTreeSet<usize>,
    pub action_set: Vec<ActionSetEl>,
    action_set_ids: BTreeMap<(i64, Vec<i64>, i64), usize>,
}

impl PdaGraph {
    pub fn new() -> Self {
        PdaGraph::default()
    }

    pub fn add_state(&mut self) -> usize {
        self.states.push(PdaState::new());
        self.states.len() - 1
    }

    pub fn set_start_state(&mut self, state: usize) {
        self.start_state = state;
    }

    pub fn set_fin_state(&mut self, state: usize) {
        self.states[state].is_final = true;
        self.fin_state_set.insert(state);
    }

    pub fn find_trans(&self, state: usize, key: i64) -> Option<&PdaTrans> {
        self.states[state].trans_map.get(&key)
    }

    pub fn find_trans_mut(&mut self, state: usize, key: i64) -> Option<&mut PdaTrans> {
        self.states[state].trans_map.get_mut(&key)
    }

    /// Target of the transition on `key`, which must exist and must shift.
    pub fn trans_target(&self, state: usize, key: i64) -> usize {
        self.find_trans(state, key)
            .and_then(|t| t.to_state)
            .expect("transition should exist and shift")
    }

    pub fn append_new_trans(
        &mut self,
        from: usize,
        key: i64,
        to_state: Option<usize>,
        is_shift: bool,
        shift_prior: i64,
    ) -> &mut PdaTrans {
        let mut trans = PdaTrans::new(key);
        trans.to_state = to_state;
        trans.is_shift = is_shift;
        trans.shift_prior = shift_prior;
        if let Some(to) = to_state {
            self.states[to].in_range.push((from, key));
        }
        let old = self.states[from].trans_map.insert(key, trans);
        debug_assert!(old.is_none());
        self.states[from].trans_map.get_mut(&key).unwrap()
    }

    /// Fetch the transition on (state, key), creating a bare reduce carrier
    /// if it is not there yet.
    pub fn find_or_new_trans(&mut self, state: usize, key: i64) -> &mut PdaTrans {
        self.states[state]
            .trans_map
            .entry(key)
            .or_insert_with(|| PdaTrans::new(key))
    }

    /// Point an existing transition at a (new) target state, keeping the
    /// incoming reference lists straight.
    pub fn retarget_trans(&mut self, state: usize, key: i64, to_state: usize) {
        let old = {
            let trans = self.states[state]
                .trans_map
                .get_mut(&key)
                .expect("transition should exist");
            let old = trans.to_state;
            trans.to_state = Some(to_state);
            old
        };
        if let Some(old_to) = old {
            self.states[old_to]
                .in_range
                .retain(|(f, k)| !(*f == state && *k == key));
        }
        self.states[to_state].in_range.push((state, key));
    }

    /// Detach and drop the transition on (state, key).
    pub fn remove_trans(&mut self, state: usize, key: i64) {
        if let Some(trans) = self.states[state].trans_map.remove(&key) {
            if let Some(to) = trans.to_state {
                self.states[to]
                    .in_range
                    .retain(|(f, k)| !(*f == state && *k == key));
            }
        }
    }

    /// Redirect all incoming transitions of `src` to `dest`.
    pub fn in_trans_move(&mut self, dest: usize, src: usize) {
        let in_range: Vec<(usize, i64)> = self.states[src].in_range.drain(..).collect();
        for (from, key) in in_range {
            if let Some(trans) = self.states[from].trans_map.get_mut(&key) {
                trans.to_state = Some(dest);
            }
            self.states[dest].in_range.push((from, key));
        }
    }

    /// Tombstone every state not reachable from the given entry states.
    pub fn remove_unreachable_states(&mut self, entries: &[usize]) {
        let mut reached = vec![false; self.states.len()];
        let mut stack: Vec<usize> = entries.to_vec();
        for &entry in entries {
            reached[entry] = true;
        }
        while let Some(state) = stack.pop() {
            let targets: Vec<usize> = self.states[state]
                .trans_map
                .values()
                .filter_map(|t| t.to_state)
                .collect();
            for to in targets {
                if !reached[to] {
                    reached[to] = true;
                    stack.push(to);
                }
            }
        }
        for (index, state) in self.states.iter_mut().enumerate() {
            if !reached[index] {
                state.dead = true;
            }
        }
    }

    /// Dense numbering over the live states, in creation order.
    pub fn set_state_numbers(&mut self) {
        let mut next = 0;
        for state in self.states.iter_mut() {
            if state.dead {
                state.state_num = -1;
            } else {
                state.state_num = next;
                next += 1;
            }
        }
    }

    pub fn num_live_states(&self) -> usize {
        self.states.iter().filter(|s| !s.dead).count()
    }

    pub fn live_states(&self) -> impl Iterator<Item = (usize, &PdaState)> {
        self.states.iter().enumerate().filter(|(_, s)| !s.dead)
    }

    /// Length of the linear path from the start state. Only meaningful for
    /// the per production machines.
    pub fn fsm_length(&self) -> i64 {
        let mut length = 0;
        let mut state = self.start_state;
        while let Some(trans) = self.states[state].trans_map.values().next() {
            length += 1;
            state = trans.to_state.expect("production machines always shift");
        }
        length
    }

    /// Intern an action set entry, returning its index. Entries get dense
    /// ids in insertion order.
    pub fn insert_action_set(
        &mut self,
        targ: i64,
        actions: &[ActionCode],
        commit_len: i64,
    ) -> usize {
        let key = (
            targ,
            actions.iter().map(|a| a.code()).collect::<Vec<i64>>(),
            commit_len,
        );
        if let Some(&index) = self.action_set_ids.get(&key) {
            return index;
        }
        let index = self.action_set.len();
        self.action_set.push(ActionSetEl {
            id: index as i64,
            targ,
            actions: actions.to_vec(),
            commit_len,
        });
        self.action_set_ids.insert(key, index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_code_packing() {
        let shift = ActionCode::shift();
        assert_eq!(shift.tag(), SHIFT_CODE);
        let reduce = ActionCode::reduce(11);
        assert_eq!(reduce.tag(), REDUCE_CODE);
        assert_eq!(reduce.prod_id(), 11);
        let shift_reduce = ActionCode::shift_reduce(7);
        assert_eq!(shift_reduce.tag(), SHIFT_REDUCE_CODE);
        assert_eq!(shift_reduce.prod_id(), 7);
        assert_ne!(reduce.code(), 0);
        assert_eq!(format!("{}", reduce), "reduce(11)");
    }

    #[test]
    fn trans_bookkeeping() {
        let mut graph = PdaGraph::new();
        let s0 = graph.add_state();
        let s1 = graph.add_state();
        let s2 = graph.add_state();
        graph.append_new_trans(s0, 3, Some(s1), true, 0);
        graph.append_new_trans(s1, 4, Some(s2), true, 0);
        assert_eq!(graph.states[s1].in_range, vec![(s0, 3)]);
        assert_eq!(graph.trans_target(s0, 3), s1);

        let s3 = graph.add_state();
        graph.in_trans_move(s3, s1);
        assert!(graph.states[s1].in_range.is_empty());
        assert_eq!(graph.trans_target(s0, 3), s3);

        graph.remove_unreachable_states(&[s0]);
        assert!(graph.states[s1].dead);
        assert!(graph.states[s2].dead);
        graph.set_state_numbers();
        assert_eq!(graph.states[s0].state_num, 0);
        assert_eq!(graph.states[s3].state_num, 1);
        assert_eq!(graph.states[s1].state_num, -1);
        assert_eq!(graph.num_live_states(), 2);
    }

    #[test]
    fn action_set_dedup() {
        let mut graph = PdaGraph::new();
        let actions = [ActionCode::shift()];
        let a = graph.insert_action_set(3, &actions, 0);
        let b = graph.insert_action_set(3, &actions, 0);
        let c = graph.insert_action_set(4, &actions, 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(graph.action_set[a].id, a as i64);
        assert_eq!(graph.action_set.len(), 2);
    }
}
