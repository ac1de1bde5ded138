/*! Block implementation

Blocks are the building blocks of the decoder pipeline. They each do one
thing, and are connected with streams. A [`Graph`][crate::graph::Graph]
calls `work()` on each of them in turn.
*/

use crate::Result;

/** Return type for all blocks.

This will let the graph know if more data could come out of this block, or if
it should just never bother calling it again.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRet {
    /// The block did something. Call it again soon.
    Again,

    /// Block didn't produce anything this time, but may do so without any
    /// new input. E.g. a source that read an empty frame.
    Pending,

    /// Produced nothing, because there was no input.
    Noop,

    /// Block indicates that it will never produce more output.
    ///
    /// Examples:
    /// * The byte stream was closed by the remote end.
    /// * The input stream is closed and fully drained.
    EOF,
}

/**
Block trait, that must be implemented for all blocks.
*/
pub trait Block {
    /** Name of block

    Not name of *instance* of block.
     */
    fn block_name(&self) -> &'static str;

    /** Block work function

    Do as much work as is available, and report back what happened. Errors
    are fatal for the graph running the block, so only unrecoverable
    failures (like I/O errors on the transport) should be returned as `Err`.
     */
    fn work(&mut self) -> Result<BlockRet>;
}
