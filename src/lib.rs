// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Whole-program, context-, flow- and field-sensitive alias analysis core.
//!
//! The crate provides three cooperating pieces:
//!
//! * [`wpa`] -- the transfer-function/merge protocol ("hooks") any dataflow
//!   analysis over the whole program implements, together with the
//!   may/must value domain and the conformance-checking machinery.
//! * [`pta`] -- the concrete alias analysis implementing that protocol over
//!   per-context points-to graphs, with a read-only query API for
//!   downstream consumers.
//! * [`graph`] -- call-graph construction with a bottom-up processing
//!   order for summary-based interprocedural analysis.
//!
//! The whole-program driver that walks control-flow graphs and invokes the
//! hooks in the correct order is an external collaborator, as is the front
//! end producing the intermediate representation ([`mir`]).

pub mod graph;
pub mod mir;
pub mod pta;
pub mod wpa;
