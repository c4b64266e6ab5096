//! Mutable slots rebindable across program points.
//!
//! A variable holds "the current node" for some logical value while a stub
//! is assembled; the label protocol rewrites it at every join point so that
//! reads always observe a value valid on the path being emitted. Variables
//! live in a session-wide registry on the assembler: labels created at any
//! time see every variable created before or after them.

use crate::{
    error::{fail, StubError},
    StubAssembler,
};
use compact_str::CompactString;
use cranelift_entity::packed_option::PackedOption;
use opal_graph::{MachineRep, Node};
use std::fmt;

opal_graph::entity_ref_16bit! {
    /// ID of a variable within its owning assembler session.
    pub struct Variable;
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "variable v{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct VariableData {
    rep: MachineRep,
    /// Unbound when empty. Overwritten by explicit binds and by label binds.
    value: PackedOption<Node>,
    name: Option<CompactString>,
}

impl VariableData {
    pub(crate) fn new(rep: MachineRep, name: Option<CompactString>) -> Self {
        Self {
            rep,
            value: PackedOption::default(),
            name,
        }
    }

    pub(crate) fn rep(&self) -> MachineRep {
        self.rep
    }

    pub(crate) fn value(&self) -> PackedOption<Node> {
        self.value
    }

    pub(crate) fn set_value(&mut self, value: Option<Node>) {
        self.value = value.into();
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl StubAssembler<'_> {
    /// Registers a new, unbound variable of the given representation.
    pub fn variable(&mut self, rep: MachineRep) -> Variable {
        self.variables.push(VariableData::new(rep, None))
    }

    pub fn named_variable(&mut self, rep: MachineRep, name: impl Into<CompactString>) -> Variable {
        self.variables.push(VariableData::new(rep, Some(name.into())))
    }

    /// Overwrites the variable's current value unconditionally.
    pub fn bind_var(&mut self, variable: Variable, value: Node) {
        self.variables[variable].set_value(Some(value));
    }

    /// The variable's current value. Fails fast if nothing has been bound
    /// along the path being assembled.
    pub fn var_value(&self, variable: Variable) -> Node {
        match self.variables[variable].value().expand() {
            Some(value) => value,
            None => fail(StubError::UnboundVariable(variable)),
        }
    }

    pub fn var_is_bound(&self, variable: Variable) -> bool {
        self.variables[variable].value().is_some()
    }

    pub fn var_rep(&self, variable: Variable) -> MachineRep {
        self.variables[variable].rep()
    }
}
