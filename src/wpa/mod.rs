// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The analysis-hook contract: the transfer-function/merge protocol a
//! whole-program analysis implements, plus the may/must value domain.
//!
//! A whole-program analysis keeps its state for the whole program and is
//! driven one basic block at a time. For each block of each iteration the
//! driver invokes, in order: `init` (fresh contexts only) or the pull
//! sequence, then the per-statement assign/kill/use hooks in statement
//! order, then `aggregate_results`. Iteration stops when no block reports
//! a changed solution.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use bitflags::bitflags;
use itertools::Itertools;
use thiserror::Error;

use crate::mir::context::Context;
use crate::mir::path::Path;
use crate::mir::{ActualArg, BlockId, Literal};

/// Must- or may- information.
///
/// `PtgAll` is the wildcard used when querying and merging; it is never
/// stored on a reference edge.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub enum Certainty {
    Possible = 1,
    Definite = 2,
    PtgAll = 3,
}

impl Certainty {
    /// Does this marker admit `other`, viewing both as bit-masks?
    #[inline]
    pub fn admits(self, other: Certainty) -> bool {
        (self as u8) & (other as u8) != 0
    }

    /// Inflationary join: `Definite` survives only when both sides agree.
    #[inline]
    pub fn join(self, other: Certainty) -> Certainty {
        if self == Certainty::Definite && other == Certainty::Definite {
            Certainty::Definite
        } else {
            Certainty::Possible
        }
    }
}

impl Display for Certainty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Certainty::Possible => f.write_str("POSSIBLE"),
            Certainty::Definite => f.write_str("DEFINITE"),
            Certainty::PtgAll => f.write_str("PTG_ALL"),
        }
    }
}

/// Set of possible dynamic type names. Ordered so that dumps are
/// deterministic.
pub type TypeSet = BTreeSet<String>;

/// An abstract scalar attached to a storage node's value slot.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum AbstractValue {
    Lit(Literal),
    Unknown,
}

impl AbstractValue {
    /// The join of two different literals is `Unknown`.
    pub fn join(&self, other: &AbstractValue) -> AbstractValue {
        if self == other {
            self.clone()
        } else {
            AbstractValue::Unknown
        }
    }
}

impl Display for AbstractValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AbstractValue::Lit(lit) => write!(f, "{}", lit),
            AbstractValue::Unknown => f.write_str("unknown"),
        }
    }
}

bitflags! {
    /// The per-instance override table: the hooks an analysis actually
    /// implements, consulted by conformance checking.
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
    pub struct HookSet: u32 {
        const INIT                = 1 << 0;
        const FORWARD_BIND        = 1 << 1;
        const BACKWARD_BIND       = 1 << 2;
        const ASSIGN_UNKNOWN      = 1 << 3;
        const ASSIGN_UNKNOWN_TYPED = 1 << 4;
        const ASSIGN_SCALAR       = 1 << 5;
        const ASSIGN_EMPTY_ARRAY  = 1 << 6;
        const ASSIGN_VALUE        = 1 << 7;
        const ASSIGN_BY_REF       = 1 << 8;
        const ASSIGN_BY_COPY      = 1 << 9;
        const KILL_VALUE          = 1 << 10;
        const KILL_BY_COPY        = 1 << 11;
        const KILL_BY_REF         = 1 << 12;
        const RECORD_USE          = 1 << 13;
        const PULL_INIT           = 1 << 14;
        const PULL_FIRST_PRED     = 1 << 15;
        const PULL_PRED           = 1 << 16;
        const PULL_FINISH         = 1 << 17;
        const AGGREGATE_RESULTS   = 1 << 18;
    }
}

impl HookSet {
    /// Hooks a complete analysis must provide. The delegating
    /// specializations (`assign_by_ref`/`assign_by_copy`,
    /// `kill_by_copy`/`kill_by_ref`) and `record_use` keep their defaults.
    pub const REQUIRED: HookSet = HookSet::INIT
        .union(HookSet::FORWARD_BIND)
        .union(HookSet::BACKWARD_BIND)
        .union(HookSet::ASSIGN_UNKNOWN)
        .union(HookSet::ASSIGN_SCALAR)
        .union(HookSet::ASSIGN_EMPTY_ARRAY)
        .union(HookSet::ASSIGN_VALUE)
        .union(HookSet::KILL_VALUE)
        .union(HookSet::PULL_INIT)
        .union(HookSet::PULL_FIRST_PRED)
        .union(HookSet::PULL_PRED)
        .union(HookSet::PULL_FINISH)
        .union(HookSet::AGGREGATE_RESULTS);
}

fn hook_name(hook: HookSet) -> &'static str {
    hook.iter_names().next().map(|(name, _)| name).unwrap_or("?")
}

/// How strictly an analysis instance is checked against the hook contract.
///
/// Although not every analysis needs to implement every hook, it is useful
/// during development to check which conform, especially while the
/// interfaces are changing. Strict modes exist for that purpose and are
/// not meant for production runs.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Conformance {
    /// Unimplemented hooks silently keep their no-op default.
    #[default]
    Permissive,
    /// [`WpaAnalysis::check_conformance`] fails, listing every missing
    /// required hook.
    StrictAtConstruction,
    /// The first invocation of an unimplemented hook fails.
    StrictAtCall,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WpaError {
    #[error("analysis `{analysis}` does not implement invoked hook {hook}")]
    NotConforming {
        analysis: String,
        hook: &'static str,
    },
    #[error("analysis `{analysis}` is missing required hooks: {hooks}")]
    MissingHooks { analysis: String, hooks: String },
}

pub type WpaResult = Result<(), WpaError>;

/// The transfer-function/merge protocol a whole-program analysis
/// implements.
///
/// Every mutating hook has a no-op default body routed through
/// [`WpaAnalysis::default_hook`], so an analysis only overrides the hooks
/// it cares about. The specialized assignment and kill hooks default to
/// their generalized forms by pure delegation; overriding them buys extra
/// precision, not different semantics.
pub trait WpaAnalysis {
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// The override table consulted by conformance checking.
    fn implemented_hooks(&self) -> HookSet {
        HookSet::empty()
    }

    /// Resolved once per analysis instance.
    fn conformance(&self) -> Conformance {
        Conformance::Permissive
    }

    /// Central default body for every unoverridden hook.
    fn default_hook(&self, hook: HookSet) -> WpaResult {
        match self.conformance() {
            Conformance::StrictAtCall if !self.implemented_hooks().contains(hook) => {
                Err(WpaError::NotConforming {
                    analysis: self.name().to_string(),
                    hook: hook_name(hook),
                })
            }
            _ => Ok(()),
        }
    }

    /// The construction-time self-check: under
    /// [`Conformance::StrictAtConstruction`], fails listing every required
    /// hook absent from [`WpaAnalysis::implemented_hooks`].
    fn check_conformance(&self) -> WpaResult {
        if self.conformance() != Conformance::StrictAtConstruction {
            return Ok(());
        }
        let missing = HookSet::REQUIRED.difference(self.implemented_hooks());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(WpaError::MissingHooks {
                analysis: self.name().to_string(),
                hooks: missing.iter_names().map(|(name, _)| name).join(", "),
            })
        }
    }

    /*
     * Interprocedural handling
     */

    /// Seed entry facts for a fresh context (e.g. the program's outermost
    /// context).
    fn init(&mut self, _outer: &Rc<Context>) -> WpaResult {
        self.default_hook(HookSet::INIT)
    }

    /// Propagate caller results to the callee entry, binding `actuals` to
    /// the callee's formals and recording `retval` as the variable the
    /// return value flows back into.
    fn forward_bind(
        &mut self,
        _caller: &Rc<Context>,
        _entry: &Rc<Context>,
        _actuals: &[ActualArg],
        _retval: Option<&Rc<Path>>,
    ) -> WpaResult {
        self.default_hook(HookSet::FORWARD_BIND)
    }

    /// Propagate callee results at `exit` back to the caller.
    fn backward_bind(&mut self, _caller: &Rc<Context>, _exit: &Rc<Context>) -> WpaResult {
        self.default_hook(HookSet::BACKWARD_BIND)
    }

    /*
     * Assigning values
     */

    /// We don't know anything about the value.
    fn assign_unknown(&mut self, _cx: &Rc<Context>, _name: &Rc<Path>, _cert: Certainty) -> WpaResult {
        self.default_hook(HookSet::ASSIGN_UNKNOWN)
    }

    /// But we do know its type.
    fn assign_unknown_typed(
        &mut self,
        cx: &Rc<Context>,
        name: &Rc<Path>,
        _types: &TypeSet,
        cert: Certainty,
    ) -> WpaResult {
        self.assign_unknown(cx, name, cert)
    }

    /// Case where we know the value of the RHS.
    fn assign_scalar(
        &mut self,
        _cx: &Rc<Context>,
        _lhs: &Rc<Path>,
        _rhs: &Literal,
        _cert: Certainty,
    ) -> WpaResult {
        self.default_hook(HookSet::ASSIGN_SCALAR)
    }

    /// A freshly allocated empty aggregate, identified by `unique_name`.
    fn assign_empty_array(
        &mut self,
        _cx: &Rc<Context>,
        _lhs: &Rc<Path>,
        _unique_name: &str,
        _cert: Certainty,
    ) -> WpaResult {
        self.default_hook(HookSet::ASSIGN_EMPTY_ARRAY)
    }

    /// Propagate an existing binding from `rhs` to `lhs`. Used whenever
    /// the way the value is propagated doesn't matter; called by default
    /// from `assign_by_ref` and `assign_by_copy`.
    fn assign_value(
        &mut self,
        _cx: &Rc<Context>,
        _lhs: &Rc<Path>,
        _rhs: &Rc<Path>,
        _cert: Certainty,
    ) -> WpaResult {
        self.default_hook(HookSet::ASSIGN_VALUE)
    }

    /// `lhs` is made to reference `rhs`, with certainty `cert`.
    fn assign_by_ref(
        &mut self,
        cx: &Rc<Context>,
        lhs: &Rc<Path>,
        rhs: &Rc<Path>,
        cert: Certainty,
    ) -> WpaResult {
        self.assign_value(cx, lhs, rhs, cert)
    }

    /// `rhs` is copied into `lhs`, with certainty `cert`.
    fn assign_by_copy(
        &mut self,
        cx: &Rc<Context>,
        lhs: &Rc<Path>,
        rhs: &Rc<Path>,
        cert: Certainty,
    ) -> WpaResult {
        self.assign_value(cx, lhs, rhs, cert)
    }

    /*
     * Killing values
     */

    /// Remove `name`'s existing binding(s) before a destructive assignment.
    fn kill_value(&mut self, _cx: &Rc<Context>, _name: &Rc<Path>) -> WpaResult {
        self.default_hook(HookSet::KILL_VALUE)
    }

    /// `name`'s value is killed.
    fn kill_by_copy(&mut self, cx: &Rc<Context>, name: &Rc<Path>) -> WpaResult {
        self.kill_value(cx, name)
    }

    /// `name`'s reference set and value are killed.
    fn kill_by_ref(&mut self, cx: &Rc<Context>, name: &Rc<Path>) -> WpaResult {
        self.kill_value(cx, name)
    }

    /*
     * Special case for use-def
     */

    /// There has been a use of `use_name`, with certainty `cert`. Consumed
    /// by analyses building use-def information; not required here.
    fn record_use(&mut self, _cx: &Rc<Context>, _use_name: &Rc<Path>, _cert: Certainty) -> WpaResult {
        self.default_hook(HookSet::RECORD_USE)
    }

    /*
     * Propagating results
     */

    /// Reset the working accumulator for `cx`.
    fn pull_init(&mut self, _cx: &Rc<Context>) -> WpaResult {
        self.default_hook(HookSet::PULL_INIT)
    }

    /// Copy the first predecessor's `outs` verbatim into the accumulator;
    /// no merge is needed for a single source.
    fn pull_first_pred(&mut self, _cx: &Rc<Context>, _pred: &Rc<Context>) -> WpaResult {
        self.default_hook(HookSet::PULL_FIRST_PRED)
    }

    /// Join a further predecessor's `outs` into the accumulator.
    fn pull_pred(&mut self, _cx: &Rc<Context>, _pred: &Rc<Context>) -> WpaResult {
        self.default_hook(HookSet::PULL_PRED)
    }

    /// Commit the accumulator as the block's `ins`.
    fn pull_finish(&mut self, _cx: &Rc<Context>) -> WpaResult {
        self.default_hook(HookSet::PULL_FINISH)
    }

    /// Combine local results into an `outs` solution, setting the
    /// per-block changed flag if it differs structurally from the previous
    /// iteration's.
    fn aggregate_results(&mut self, _cx: &Rc<Context>) -> WpaResult {
        self.default_hook(HookSet::AGGREGATE_RESULTS)
    }

    /// Do we need to iterate this block again?
    fn solution_changed(&self, _block: BlockId) -> bool {
        false
    }

    /// Whether the solutions are equal, i.e. whether the whole-program
    /// iteration has reached a fixed point. Deep and structural.
    fn equals(&self, other: &dyn WpaAnalysis) -> bool;

    /*
     * Debugging information
     */

    /// Human-readable rendering of the solution at `cx`.
    fn dump(&self, cx: &Rc<Context>) -> String;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mir::BlockId;

    struct Probe {
        conformance: Conformance,
        claimed: HookSet,
    }

    impl WpaAnalysis for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn implemented_hooks(&self) -> HookSet {
            self.claimed
        }

        fn conformance(&self) -> Conformance {
            self.conformance
        }

        fn equals(&self, _other: &dyn WpaAnalysis) -> bool {
            true
        }

        fn dump(&self, _cx: &Rc<Context>) -> String {
            String::new()
        }
    }

    #[test]
    fn certainty_join() {
        use Certainty::*;
        assert_eq!(Definite.join(Definite), Definite);
        assert_eq!(Definite.join(Possible), Possible);
        assert_eq!(Possible.join(Definite), Possible);
        assert_eq!(Possible.join(Possible), Possible);
    }

    #[test]
    fn certainty_admits_is_a_mask() {
        use Certainty::*;
        assert!(PtgAll.admits(Possible));
        assert!(PtgAll.admits(Definite));
        assert!(Definite.admits(Definite));
        assert!(!Definite.admits(Possible));
        assert!(!Possible.admits(Definite));
    }

    #[test]
    fn abstract_value_join() {
        let five = AbstractValue::Lit(Literal::Int(5));
        let six = AbstractValue::Lit(Literal::Int(6));
        assert_eq!(five.join(&five), five);
        assert_eq!(five.join(&six), AbstractValue::Unknown);
        assert_eq!(AbstractValue::Unknown.join(&five), AbstractValue::Unknown);
    }

    #[test]
    fn permissive_default_hooks_are_noops() {
        let mut probe = Probe {
            conformance: Conformance::Permissive,
            claimed: HookSet::empty(),
        };
        let outer = Context::outer(BlockId(0));
        assert_eq!(probe.init(&outer), Ok(()));
        assert_eq!(probe.kill_value(&outer, &Path::var("__MAIN__", "x")), Ok(()));
        assert_eq!(probe.check_conformance(), Ok(()));
    }

    #[test]
    fn strict_at_call_fails_on_first_invocation() {
        let mut probe = Probe {
            conformance: Conformance::StrictAtCall,
            claimed: HookSet::INIT,
        };
        let outer = Context::outer(BlockId(0));
        // Claimed hooks pass, unclaimed ones fail.
        assert_eq!(probe.init(&outer), Ok(()));
        assert_eq!(
            probe.pull_init(&outer),
            Err(WpaError::NotConforming {
                analysis: "probe".to_string(),
                hook: "PULL_INIT",
            })
        );
    }

    #[test]
    fn strict_at_construction_lists_missing_hooks() {
        let probe = Probe {
            conformance: Conformance::StrictAtConstruction,
            claimed: HookSet::REQUIRED.difference(HookSet::AGGREGATE_RESULTS),
        };
        match probe.check_conformance() {
            Err(WpaError::MissingHooks { analysis, hooks }) => {
                assert_eq!(analysis, "probe");
                assert_eq!(hooks, "AGGREGATE_RESULTS");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn specialized_hooks_delegate_to_generalized_ones() {
        // by_ref/by_copy fall through to assign_value/kill_value, so a
        // strict probe reports the generalized hook as the missing one.
        let mut probe = Probe {
            conformance: Conformance::StrictAtCall,
            claimed: HookSet::empty(),
        };
        let outer = Context::outer(BlockId(0));
        let x = Path::var("__MAIN__", "x");
        let y = Path::var("__MAIN__", "y");
        match probe.assign_by_copy(&outer, &x, &y, Certainty::Definite) {
            Err(WpaError::NotConforming { hook, .. }) => assert_eq!(hook, "ASSIGN_VALUE"),
            other => panic!("unexpected result: {:?}", other),
        }
        match probe.kill_by_ref(&outer, &x) {
            Err(WpaError::NotConforming { hook, .. }) => assert_eq!(hook, "KILL_VALUE"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
