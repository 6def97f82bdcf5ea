//! Processes lowered from procedural blocks.
//!
//! A [`Process`] holds a decision tree of [`CaseRule`]s and [`SwitchRule`]s
//! that computes the next value of each driven signal, and [`SyncRule`]s that
//! say when those values are committed.

use crate::sigspec::SigSpec;
use crate::wire::Attributes;
use serde::{Deserialize, Serialize};
use vela_common::Ident;

/// One `lhs <= rhs` action.
pub type Action = (SigSpec, SigSpec);

/// A branch of a switch: applies its actions when the switch signal matches
/// one of `compare` (or always, when `compare` is empty).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseRule {
    /// Values the switch signal is compared against.
    pub compare: Vec<SigSpec>,
    /// Assignments performed in this branch.
    pub actions: Vec<Action>,
    /// Nested switches, evaluated after the actions.
    pub switches: Vec<SwitchRule>,
    /// Attributes.
    pub attributes: Attributes,
}

/// A multi-way branch on `signal`; the first matching case wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchRule {
    /// The switched signal.
    pub signal: SigSpec,
    /// Cases in priority order.
    pub cases: Vec<CaseRule>,
    /// Attributes such as `full_case` and `parallel_case`.
    pub attributes: Attributes,
}

/// When a sync rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncKind {
    /// Rising edge of the signal.
    Posedge,
    /// Falling edge of the signal.
    Negedge,
    /// Both edges of the signal.
    Edge,
    /// Continuously (combinational logic).
    Always,
    /// Once at start-up.
    Init,
}

/// Commits values on an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRule {
    /// Event kind.
    pub kind: SyncKind,
    /// Event signal; empty for `Always` and `Init`.
    pub signal: SigSpec,
    /// Signals updated when the rule fires.
    pub actions: Vec<Action>,
}

impl SyncRule {
    /// A rule of `kind` on `signal` without actions.
    pub fn new(kind: SyncKind, signal: SigSpec) -> Self {
        Self {
            kind,
            signal,
            actions: Vec::new(),
        }
    }
}

/// A lowered procedural block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    /// Process name.
    pub name: Ident,
    /// Root of the decision tree.
    pub root_case: CaseRule,
    /// Commit rules.
    pub syncs: Vec<SyncRule>,
    /// Attributes.
    pub attributes: Attributes,
}

impl Process {
    /// An empty process.
    pub fn new(name: Ident) -> Self {
        Self {
            name,
            root_case: CaseRule::default(),
            syncs: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    /// True if any sync rule is edge triggered.
    pub fn is_clocked(&self) -> bool {
        self.syncs
            .iter()
            .any(|s| matches!(s.kind, SyncKind::Posedge | SyncKind::Negedge | SyncKind::Edge))
    }
}

impl CaseRule {
    /// Visits this rule and every nested case rule, depth first.
    pub fn for_each_case(&self, f: &mut impl FnMut(&CaseRule)) {
        f(self);
        for switch in &self.switches {
            for case in &switch.cases {
                case.for_each_case(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WireId;

    #[test]
    fn clocked_detection() {
        let mut p = Process::new(Ident::from_raw(0));
        assert!(!p.is_clocked());
        p.syncs.push(SyncRule::new(SyncKind::Always, SigSpec::new()));
        assert!(!p.is_clocked());
        p.syncs
            .push(SyncRule::new(SyncKind::Posedge, SigSpec::wire(WireId::from_raw(0), 1)));
        assert!(p.is_clocked());
    }

    #[test]
    fn nested_case_walk() {
        let mut root = CaseRule::default();
        root.switches.push(SwitchRule {
            signal: SigSpec::wire(WireId::from_raw(0), 1),
            cases: vec![CaseRule::default(), CaseRule::default()],
            attributes: Attributes::new(),
        });
        let mut count = 0;
        root.for_each_case(&mut |_| count += 1);
        assert_eq!(count, 3);
    }
}
