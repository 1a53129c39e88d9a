/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; acquisition may be retried.
    Reconfigured,
    /// Transient error; skip presentation for the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); the backend must stop rendering.
    Fatal,
}
