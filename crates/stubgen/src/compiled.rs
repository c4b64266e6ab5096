//! Handle over a finished stub, passed to the downstream code generator.

use compact_str::CompactString;
use opal_graph::{Graph, Schedule};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodeKind {
    Stub,
    Builtin,
}

/// The assembled graph and its block schedule, along with metadata the
/// downstream pipeline needs to emit and register the code object.
pub struct CompiledStub {
    name: CompactString,
    kind: CodeKind,
    graph: Graph,
    schedule: Schedule,
}

impl CompiledStub {
    pub(crate) fn new(
        name: CompactString,
        kind: CodeKind,
        graph: Graph,
        schedule: Schedule,
    ) -> Self {
        Self {
            name,
            kind,
            graph,
            schedule,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CodeKind {
        self.kind
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}
