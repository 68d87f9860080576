// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use crate::grammar::Compiler;
use crate::pda::{PdaGraph, PdaState};

/// The flat, index compressed tables the runtime executes. Action runs are
/// zero terminated; `targs` and `commit_len` are indexed by action set id;
/// region lists are written as `id + 1` with zero meaning none.
#[derive(Debug, Default)]
pub struct PdaTables {
    pub num_states: usize,
    pub offsets: Vec<u32>,
    /// (low key, high key) per state, (0, 0) when the state has no
    /// transitions.
    pub keys: Vec<i64>,
    pub indicies: Vec<i64>,
    pub owners: Vec<i64>,
    pub act_inds: Vec<u32>,
    pub actions: Vec<i64>,
    pub targs: Vec<i64>,
    pub commit_len: Vec<i64>,
    pub token_region_inds: Vec<i64>,
    pub token_regions: Vec<i64>,
    pub token_pre_regions: Vec<i64>,
    pub start_states: Vec<i64>,
    pub eof_lel_ids: Vec<i64>,
    pub parser_lel_ids: Vec<i64>,
    pub first_non_term_id: i64,
    /// Capture attributes are not populated yet; the table is carried for
    /// layout compatibility.
    pub num_captured_attr: usize,
}

impl PdaTables {
    /// Decode the action set for (state, symbol): the target state, the
    /// zero terminated action run (terminator excluded) and the commit
    /// length. This is the exact access path the runtime takes.
    pub fn lookup(&self, state: i64, key: i64) -> Option<(i64, &[i64], i64)> {
        let low = self.keys[(state * 2) as usize];
        let high = self.keys[(state * 2 + 1) as usize];
        if key < low || key > high {
            return None;
        }
        let index = self.offsets[state as usize] as usize + (key - low) as usize;
        if self.owners[index] != state {
            return None;
        }
        let el = self.indicies[index] as usize;
        let start = self.act_inds[el] as usize;
        let mut end = start;
        while self.actions[end] != 0 {
            end += 1;
        }
        Some((self.targs[el], &self.actions[start..end], self.commit_len[el]))
    }

    /// The scan regions of a state, decoded from the zero terminated list.
    pub fn regions_of(&self, state: i64) -> Vec<i64> {
        let mut result = Vec::new();
        let mut index = self.token_region_inds[state as usize] as usize;
        while self.token_regions[index] != 0 {
            result.push(self.token_regions[index] - 1);
            index += 1;
        }
        result
    }
}

/// First fit placement: try successive offsets until every key slot the
/// state needs is unoccupied.
fn find_index_off(tables: &PdaTables, state: &PdaState, cur_len: usize) -> usize {
    'next_start: for start in 0..cur_len {
        let mut offset = start;
        let keys: Vec<i64> = state.trans_map.keys().cloned().collect();
        for (position, &key) in keys.iter().enumerate() {
            if tables.owners[offset] != -1 {
                continue 'next_start;
            }
            offset += 1;
            if position + 1 < keys.len() {
                offset += (keys[position + 1] - key - 1) as usize;
            }
        }
        // Got through the whole list without a conflict.
        return start;
    }
    cur_len
}

pub(crate) fn make_pda_tables(cp: &Compiler, graph: &PdaGraph) -> PdaTables {
    let mut tables = PdaTables::default();

    // States in their final numbering.
    let mut states: Vec<&PdaState> = graph.states.iter().filter(|s| !s.dead).collect();
    states.sort_by_key(|s| s.state_num);
    let num_states = states.len();
    tables.num_states = num_states;

    // Oversized co-allocation of indicies and owners: the sum of every
    // state's key span is the worst case, packing only improves on it.
    let mut count = 0;
    for state in states.iter() {
        let keys: Vec<i64> = state.trans_map.keys().cloned().collect();
        for (position, &key) in keys.iter().enumerate() {
            count += 1;
            if position + 1 < keys.len() {
                count += (keys[position + 1] - key - 1) as usize;
            }
        }
    }
    tables.indicies = vec![-1; count];
    tables.owners = vec![-1; count];
    tables.offsets = vec![0; num_states];

    let mut ind_len = 0;
    for state in states.iter() {
        let ind_off = find_index_off(&tables, state, ind_len);
        tables.offsets[state.state_num as usize] = ind_off as u32;

        let mut offset = ind_off;
        let keys: Vec<i64> = state.trans_map.keys().cloned().collect();
        for (position, &key) in keys.iter().enumerate() {
            let trans = &state.trans_map[&key];
            let el = trans.action_set.expect("actions are interned by now");
            tables.indicies[offset] = el as i64;
            tables.owners[offset] = state.state_num;
            offset += 1;
            if position + 1 < keys.len() {
                offset += (keys[position + 1] - key - 1) as usize;
            }
        }
        if offset > ind_len {
            ind_len = offset;
        }
    }
    // The allocation was the worst case; compression gives us less.
    tables.indicies.truncate(ind_len);
    tables.owners.truncate(ind_len);

    // Keys.
    tables.keys = vec![0; num_states * 2];
    for state in states.iter() {
        if let (Some(first), Some(last)) = (
            state.trans_map.keys().next(),
            state.trans_map.keys().next_back(),
        ) {
            tables.keys[(state.state_num * 2) as usize] = *first;
            tables.keys[(state.state_num * 2 + 1) as usize] = *last;
        }
    }

    // Targs, act inds, actions and commit lengths from the interned sets.
    let mut pos = 0;
    for el in graph.action_set.iter() {
        tables.targs.push(el.targ);
        tables.act_inds.push(pos as u32);
        for action in el.actions.iter() {
            tables.actions.push(action.code());
        }
        tables.actions.push(0);
        pos += el.actions.len() + 1;
        tables.commit_len.push(el.commit_len);
    }

    // Region tables. The leading zero makes index zero mean unset; entries
    // are region id plus one, and the pre region column mirrors the region
    // column with -1 for a suppressed or absent pre region.
    tables.token_region_inds = vec![0; num_states];
    tables.token_regions.push(0);
    tables.token_pre_regions.push(0);
    let mut pos = 1;
    for state in states.iter() {
        tables.token_region_inds[state.state_num as usize] = pos;
        pos += state.regions.len() as i64 + 1;

        debug_assert!(state.pre_regions.len() <= 1);
        for region in state.regions.iter() {
            tables.token_regions.push(region.id() + 1);
            if state.pre_regions.is_empty() || state.pre_regions[0].was_empty() {
                tables.token_pre_regions.push(-1);
            } else {
                tables.token_pre_regions.push(state.pre_regions[0].id() + 1);
            }
        }
        tables.token_regions.push(0);
        tables.token_pre_regions.push(0);
    }

    // Per parser entry points.
    for parser_el in cp.parser_els().iter() {
        let start = parser_el.start_state() as usize;
        tables.start_states.push(graph.states[start].state_num);
        tables
            .eof_lel_ids
            .push(parser_el.eof_lel().expect("parsers own an EOF terminal").id());
        tables.parser_lel_ids.push(parser_el.id());
    }
    tables.first_non_term_id = cp.first_non_term_id();
    tables.num_captured_attr = 0;

    tables
}

#[cfg(test)]
mod tests {
    use crate::grammar::Compiler;
    use crate::production::ProdEl;

    #[test]
    fn round_trip_against_graph() {
        // line: line a | b;
        let mut cp = Compiler::new();
        let a = cp.new_token("a", None).unwrap();
        let b = cp.new_token("b", None).unwrap();
        let line = cp.new_non_terminal("line").unwrap();
        cp.new_production(&line, &[ProdEl::new(&line), ProdEl::new(&a)]);
        cp.new_production(&line, &[ProdEl::new(&b)]);
        cp.add_parser(&line).unwrap();
        cp.build_parsers().unwrap();

        let graph = cp.pda_graph().unwrap();
        let tables = cp.pda_tables().unwrap();

        for (_, state) in graph.live_states() {
            for (&key, trans) in state.trans_map.iter() {
                let el = &graph.action_set[trans.action_set.unwrap()];
                let (targ, actions, commit_len) = tables
                    .lookup(state.state_num, key)
                    .expect("every live transition decodes");
                assert_eq!(targ, el.targ);
                assert_eq!(commit_len, el.commit_len);
                let codes: Vec<i64> = el.actions.iter().map(|a| a.code()).collect();
                assert_eq!(actions, codes.as_slice());
            }
            // Keys outside the state's span decode to nothing.
            let low = tables.keys[(state.state_num * 2) as usize];
            if low > 1 {
                assert!(tables.lookup(state.state_num, low - 1).is_none());
            }
        }
    }

    #[test]
    fn parser_entry_tables() {
        let mut cp = Compiler::new();
        let b = cp.new_token("b", None).unwrap();
        let line = cp.new_non_terminal("line").unwrap();
        cp.new_production(&line, &[ProdEl::new(&b)]);
        cp.add_parser(&line).unwrap();
        cp.build_parsers().unwrap();

        let tables = cp.pda_tables().unwrap();
        assert_eq!(tables.start_states.len(), 1);
        assert_eq!(tables.parser_lel_ids, vec![line.id()]);
        assert_eq!(tables.eof_lel_ids, vec![line.eof_lel().unwrap().id()]);
        assert_eq!(tables.first_non_term_id, cp.first_non_term_id());
        assert_eq!(tables.num_captured_attr, 0);
        let graph = cp.pda_graph().unwrap();
        let start = line.start_state() as usize;
        assert_eq!(tables.start_states[0], graph.states[start].state_num);
    }
}
