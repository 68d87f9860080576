// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

//! Compile a resolved grammar into compact push down automaton tables for a
//! backtracking table driven parser: production machines, first sets, the
//! shared LALR(1) graph, canonical LR(1) action ordering, precedence
//! resolution, shift reduce folding, scan region attachment and index
//! compressed output tables. The scanner, the surface grammar frontend and
//! the runtime itself live elsewhere.

pub mod error;
pub mod grammar;
pub mod lalr;
pub mod order;
pub mod pda;
pub mod production;
pub mod region;
pub mod resolve;
pub mod symbol;
pub mod tables;

pub use crate::error::{BuildError, BuildErrors, Location};
pub use crate::grammar::Compiler;
pub use crate::pda::{
    ActionCode, PdaGraph, PdaState, PdaTrans, REDUCE_CODE, SHIFT_CODE, SHIFT_REDUCE_CODE,
};
pub use crate::production::{ProdEl, Production, EPSILON};
pub use crate::region::TokenRegion;
pub use crate::symbol::{
    PredType, Symbol, SymbolError, SymbolKind, SymbolTable, LEL_ID_BOOL, LEL_ID_IGNORE,
    LEL_ID_INT, LEL_ID_PTR, LEL_ID_STR, LEL_ID_STREAM,
};
pub use crate::tables::PdaTables;
