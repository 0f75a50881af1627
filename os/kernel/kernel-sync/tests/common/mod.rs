use kernel_sync::WaitEvent;

/// Waiters give their timeslice away; keeps ticket hand-off fast when the
/// test runs more threads than there are cores.
pub struct Yield;

impl WaitEvent for Yield {
    fn wait() {
        std::thread::yield_now();
    }

    fn signal() {}
}
