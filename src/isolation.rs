use std::process::Command;

/// Detaches a child from the tray's signal group before it is spawned.
pub trait IsolateChild {
    fn isolate_child(&mut self) -> &mut Self;
}

#[cfg(unix)]
impl IsolateChild for Command {
    fn isolate_child(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // pgid 0 puts the child in a new group led by itself
        self.process_group(0)
    }
}

#[cfg(not(unix))]
impl IsolateChild for Command {
    fn isolate_child(&mut self) -> &mut Self {
        self
    }
}
