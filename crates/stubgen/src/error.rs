//! Build-time error taxonomy.
//!
//! Every variant is a programmer error in the stub being authored, not a
//! runtime condition of the generated code. None are caught or retried:
//! [`fail`] aborts stub construction so a malformed stub can never reach
//! code generation.

use crate::{label::Label, variable::Variable};

#[derive(Debug, thiserror::Error)]
pub enum StubError {
    #[error("{0} was read before any value was bound to it")]
    UnboundVariable(Variable),
    #[error("{variable} merged inconsistently into {label}: {detail}")]
    InconsistentMerge {
        variable: Variable,
        label: Label,
        detail: &'static str,
    },
    #[error("{label} was bound twice")]
    DoubleBind { label: Label },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

pub(crate) fn fail(error: StubError) -> ! {
    panic!("{error}")
}
