use std::{fmt, io, thread};

use crossbeam::channel;
use log::warn;
use signal_hook::{
    consts::signal::{SIGINT, SIGTERM},
    iterator::Signals,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Signal(i32),
    Return,
}
impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Signal(SIGINT) => write!(f, "interrupted"),
            Trigger::Signal(SIGTERM) => write!(f, "terminated"),
            Trigger::Signal(other) => write!(f, "signal {other}"),
            Trigger::Return => write!(f, "<RETURN> pressed"),
        }
    }
}

/// Blocks until SIGINT, SIGTERM or a line on stdin. A closed stdin (running
/// detached) leaves only the signals.
pub fn wait_for_shutdown() -> Trigger {
    let (tx, rx) = channel::bounded(2);

    let signal_handle = match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            let handle = signals.handle();
            let tx = tx.clone();
            thread::spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    let _ = tx.send(Trigger::Signal(signal));
                }
            });
            Some(handle)
        }
        Err(err) => {
            warn!("could not install signal handlers: {err}");
            None
        }
    };

    thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = io::stdin().read_line(&mut line) {
            if n > 0 {
                let _ = tx.send(Trigger::Return);
            }
        }
    });

    // Both senders can only disappear if neither trigger source is available.
    let trigger = rx.recv().unwrap_or(Trigger::Return);
    if let Some(handle) = signal_handle {
        handle.close();
    }
    trigger
}
