/// Logical machine block.
pub trait Block {
    /// Performs a reset on the block.
    ///
    /// Afterwards, the block should behave as if it has just been initialized
    /// to its powered-on state.
    fn reset(&mut self) {}
}
