/// Receives progress updates from the controller.
///
/// `advance` is called once per completed work unit, success or failure, with
/// a non-decreasing `done` count that ends at `total`.
pub trait ProgressSink: Send {
    fn start(&mut self, _total: usize) {}

    fn advance(&mut self, done: usize, total: usize);

    fn finish(&mut self) {}
}

/// Ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&mut self, _done: usize, _total: usize) {}
}
