//! Frame block tracking for control flow.
//!
//! Each compound statement that leaves state on the value or block stack
//! pushes a [`FrameBlock`]. `break`, `continue` and `return` walk the stack
//! from the innermost block outwards to emit the cleanup each one needs.

use crate::bytecode::Label;

/// What a frame block protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A `while` loop; nothing on the stack.
    WhileLoop,
    /// A `for` loop; the iterator is on the stack.
    ForLoop,
    /// The body of a `try` with `except` handlers.
    Except,
    /// The body of a `try` with a `finally` clause.
    FinallyTry,
    /// The `finally` body itself.
    FinallyEnd,
    /// The body of a `with` statement.
    With,
    /// The body of an `async with` statement.
    AsyncWith,
    /// An `except` handler body; the exception state is on the stack.
    HandlerCleanup,
}

impl BlockKind {
    /// Whether `break` and `continue` target this block.
    pub fn is_loop(self) -> bool {
        matches!(self, BlockKind::WhileLoop | BlockKind::ForLoop)
    }
}

/// One entry of the frame block stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBlock {
    pub kind: BlockKind,
    /// Loop start for `continue`.
    pub start: Label,
    /// Loop end for `break`, or the cleanup handler to call on unwind.
    pub exit: Option<Label>,
}

/// Stack of frame blocks for one code object.
#[derive(Debug, Default)]
pub struct BlockStack {
    /// Innermost last
    blocks: Vec<FrameBlock>,
}

impl BlockStack {
    /// Create an empty block stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a block.
    pub fn push(&mut self, kind: BlockKind, start: Label, exit: Option<Label>) {
        self.blocks.push(FrameBlock { kind, start, exit });
    }

    /// Leave the innermost block.
    pub fn pop(&mut self) -> Option<FrameBlock> {
        self.blocks.pop()
    }

    /// The innermost enclosing loop and the blocks nested inside it,
    /// innermost first.
    pub fn innermost_loop(&self) -> Option<(FrameBlock, Vec<FrameBlock>)> {
        let position = self.blocks.iter().rposition(|block| block.kind.is_loop())?;
        let inner = self.blocks[position + 1..].iter().rev().copied().collect();
        Some((self.blocks[position], inner))
    }

    /// Every block, innermost first.
    pub fn unwind_order(&self) -> Vec<FrameBlock> {
        self.blocks.iter().rev().copied().collect()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stack_has_no_loop() {
        let stack = BlockStack::new();
        assert!(stack.innermost_loop().is_none());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn innermost_loop_reports_blocks_inside_it() {
        let mut stack = BlockStack::new();
        stack.push(BlockKind::ForLoop, Label(0), Some(Label(1)));
        stack.push(BlockKind::WhileLoop, Label(2), Some(Label(3)));
        stack.push(BlockKind::FinallyTry, Label(4), Some(Label(5)));
        stack.push(BlockKind::With, Label(6), None);

        let (found, inner) = stack.innermost_loop().unwrap();
        assert_eq!(found.kind, BlockKind::WhileLoop);
        assert_eq!(found.start, Label(2));
        let kinds: Vec<_> = inner.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::With, BlockKind::FinallyTry]);
    }

    #[test]
    fn pop_restores_outer_loop() {
        let mut stack = BlockStack::new();
        stack.push(BlockKind::ForLoop, Label(0), Some(Label(1)));
        stack.push(BlockKind::WhileLoop, Label(2), Some(Label(3)));
        stack.pop();

        let (found, inner) = stack.innermost_loop().unwrap();
        assert_eq!(found.kind, BlockKind::ForLoop);
        assert!(inner.is_empty());
    }

    #[test]
    fn unwind_order_is_innermost_first() {
        let mut stack = BlockStack::new();
        stack.push(BlockKind::Except, Label(0), None);
        stack.push(BlockKind::HandlerCleanup, Label(1), Some(Label(2)));

        let kinds: Vec<_> = stack.unwind_order().iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::HandlerCleanup, BlockKind::Except]);
        assert_eq!(stack.depth(), 2);
    }
}
