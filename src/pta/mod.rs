// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Points-to analysis: graph nodes, per-context points-to graphs, and the
//! alias analysis driving them through the whole-program hook contract.

pub mod alias;
pub mod node;
pub mod points_to;

pub use alias::AliasAnalysis;
