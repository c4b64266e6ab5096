//! Block linearization handed to the downstream code generator.

use crate::graph::{BasicBlock, Graph};
use cranelift_entity::EntitySet;

/// An ordering of the graph's reachable blocks: reverse postorder from the
/// entry, with deferred (rarely-reached) blocks moved to the end so the hot
/// path stays contiguous.
#[derive(Clone, Debug)]
pub struct Schedule {
    pub order: Vec<BasicBlock>,
}

pub fn schedule(graph: &Graph) -> Schedule {
    let mut postorder = Vec::new();
    let mut visited = EntitySet::<BasicBlock>::new();

    // Iterative DFS; a block is emitted once all of its successors have been.
    let entry = graph.entry_block();
    let mut stack = vec![(entry, false)];
    visited.insert(entry);
    while let Some((block, expanded)) = stack.pop() {
        if expanded {
            postorder.push(block);
            continue;
        }
        stack.push((block, true));
        if let Some(&terminator) = graph.blocks[block].nodes.last() {
            graph.nodes[terminator].visit_successors(|successor| {
                if !visited.contains(successor) {
                    visited.insert(successor);
                    stack.push((successor, false));
                }
            });
        }
    }
    postorder.reverse();

    let (hot, cold): (Vec<_>, Vec<_>) = postorder
        .into_iter()
        .partition(|&block| !graph.blocks[block].deferred);

    let mut order = hot;
    order.extend(cold);
    Schedule { order }
}
