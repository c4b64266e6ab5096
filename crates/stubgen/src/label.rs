//! Join points with deferred merge-node construction.
//!
//! A label collects, for every variable in the session registry, the value
//! the variable carried on each control-flow edge targeting it, in the order
//! the edges were emitted. Phi nodes are only materialized when the label is
//! bound, once the set of incoming edges recorded so far is known; edges
//! arriving after the bind (loop back-edges) extend the existing phis in
//! place. Phi input order therefore always equals the block's predecessor
//! order; breaking that correspondence would silently associate merge
//! inputs with the wrong predecessors.

use crate::{
    error::{fail, StubError},
    variable::Variable,
    StubAssembler,
};
use cranelift_entity::{packed_option::PackedOption, SecondaryMap};
use opal_graph::{BasicBlock, Node};
use smallvec::SmallVec;
use std::fmt;

opal_graph::entity_ref_16bit! {
    /// ID of a label within its owning assembler session.
    pub struct Label;
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "label L{}", self.0)
    }
}

/// Per-(variable, label) merge progress.
///
/// `Unseen` until the variable arrives with a value on some edge; `Single`
/// while every edge agreed on one value; `Diverged` once two edges disagreed
/// or the stub author pre-declared the variable as merging here. The phi
/// inside `Diverged` is created when the label is bound.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum MergeState {
    #[default]
    Unseen,
    Single(Node),
    Diverged(PackedOption<Node>),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct VariableMerge {
    /// One value per incoming edge that carried one, in edge-arrival order.
    values: SmallVec<[Node; 4]>,
    state: MergeState,
}

pub(crate) struct LabelData {
    pub(crate) block: BasicBlock,
    pub(crate) bound: bool,
    /// Edges merged so far, bound or not.
    pub(crate) merge_count: u32,
    pub(crate) merges: SecondaryMap<Variable, VariableMerge>,
}

impl LabelData {
    pub(crate) fn new(block: BasicBlock, merged_variables: &[Variable]) -> Self {
        let mut merges: SecondaryMap<Variable, VariableMerge> = SecondaryMap::new();
        for &variable in merged_variables {
            merges[variable].state = MergeState::Diverged(PackedOption::default());
        }
        Self {
            block,
            bound: false,
            merge_count: 0,
            merges,
        }
    }
}

impl<'env> StubAssembler<'env> {
    pub fn label(&mut self) -> Label {
        self.create_label(false, &[])
    }

    /// A label the stub author expects to be rarely reached; its block is
    /// placed after all non-deferred blocks in the final schedule.
    pub fn deferred_label(&mut self) -> Label {
        self.create_label(true, &[])
    }

    /// A label whose listed variables are known up front to receive
    /// divergent values (loop back-edges, multi-way joins). Pre-declaring
    /// forces a phi even if all recorded values turn out to agree.
    pub fn label_merging(&mut self, merged_variables: &[Variable]) -> Label {
        self.create_label(false, merged_variables)
    }

    pub fn deferred_label_merging(&mut self, merged_variables: &[Variable]) -> Label {
        self.create_label(true, merged_variables)
    }

    fn create_label(&mut self, deferred: bool, merged_variables: &[Variable]) -> Label {
        let block = self.raw.create_block(deferred);
        self.labels.push(LabelData::new(block, merged_variables))
    }

    pub fn goto(&mut self, label: Label) {
        self.merge_variables(label);
        let block = self.labels[label].block;
        self.raw.goto(block);
    }

    pub fn branch(&mut self, condition: Node, if_true: Label, if_false: Label) {
        self.merge_variables(if_true);
        self.merge_variables(if_false);
        let if_true = self.labels[if_true].block;
        let if_false = self.labels[if_false].block;
        self.raw.branch(condition, if_true, if_false);
    }

    pub fn switch(&mut self, index: Node, default: Label, cases: &[(i32, Label)]) {
        // Case edges merge in case order, the default edge last, matching
        // the edge order the raw switch records.
        for &(_, label) in cases {
            self.merge_variables(label);
        }
        self.merge_variables(default);
        let cases: Vec<(i32, BasicBlock)> = cases
            .iter()
            .map(|&(value, label)| (value, self.labels[label].block))
            .collect();
        let default = self.labels[default].block;
        self.raw.switch(index, default, &cases);
    }

    /// Binds the label, making its block the emission point. Synthesizes one
    /// phi per diverged variable, inputs in edge-arrival order, then rebinds
    /// every registry variable to its post-merge value: the phi, or the one
    /// agreed value if it was present on every edge, or nothing.
    pub fn bind(&mut self, label: Label) {
        let data = &mut self.labels[label];
        if data.bound {
            fail(StubError::DoubleBind { label });
        }
        data.bound = true;
        self.raw.bind(data.block);
        let merge_count = data.merge_count as usize;

        for (variable, variable_data) in self.variables.iter_mut() {
            let merge = &mut data.merges[variable];
            match merge.state {
                MergeState::Diverged(_) => {
                    if merge_count == 0 || merge.values.len() != merge_count {
                        fail(StubError::InconsistentMerge {
                            variable,
                            label,
                            detail: "no value bound on an incoming edge",
                        });
                    }
                    let phi = self.raw.phi(variable_data.rep(), &merge.values);
                    tracing::trace!(
                        %variable,
                        name = variable_data.name().unwrap_or_default(),
                        %label,
                        inputs = merge.values.len(),
                        "synthesized phi"
                    );
                    merge.state = MergeState::Diverged(phi.into());
                    variable_data.set_value(Some(phi));
                }
                MergeState::Single(value) => {
                    // Keep the agreed value only if it arrived on all edges.
                    let on_every_edge = merge.values.len() == merge_count;
                    variable_data.set_value(on_every_edge.then_some(value));
                }
                MergeState::Unseen => variable_data.set_value(None),
            }
        }
    }

    /// Records the current value of every registry variable as one new
    /// incoming edge of `label`. Runs once per control transfer targeting
    /// the label, immediately before the transfer is emitted, so the edge
    /// log stays aligned with the block's predecessor list.
    fn merge_variables(&mut self, label: Label) {
        let data = &mut self.labels[label];
        data.merge_count += 1;
        for (variable, variable_data) in self.variables.iter() {
            let merge = &mut data.merges[variable];
            let Some(value) = variable_data.value().expand() else {
                // Unbound is fine unless this variable must merge here.
                if let MergeState::Diverged(_) = merge.state {
                    fail(StubError::InconsistentMerge {
                        variable,
                        label,
                        detail: "no value bound on an incoming edge",
                    });
                }
                continue;
            };
            merge.values.push(value);
            merge.state = match merge.state {
                MergeState::Unseen => MergeState::Single(value),
                MergeState::Single(previous) if previous == value => MergeState::Single(previous),
                MergeState::Single(_) => {
                    if data.bound {
                        // The phi set of a bound label is final; list the
                        // variable when constructing the label instead.
                        fail(StubError::InconsistentMerge {
                            variable,
                            label,
                            detail: "diverged after the label was bound",
                        });
                    }
                    MergeState::Diverged(PackedOption::default())
                }
                diverged @ MergeState::Diverged(_) => diverged,
            };
            if let MergeState::Diverged(phi) = merge.state {
                if merge.values.len() != data.merge_count as usize {
                    fail(StubError::InconsistentMerge {
                        variable,
                        label,
                        detail: "no value bound on an incoming edge",
                    });
                }
                if data.bound {
                    let phi = phi.expand().expect("bound label has a diverged variable without a phi");
                    self.raw.append_phi_input(phi, value);
                }
            }
        }
    }
}
