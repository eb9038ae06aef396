// Halt Signal
// Commands the coordinator sends after a failed checkpoint

use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCommand {
    /// Stop the walk; remaining checkpoints never run
    Halt,
    /// Clear the failure and proceed to the next checkpoint
    Continue,
}

impl fmt::Display for HaltCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltCommand::Halt => f.write_str("halt"),
            HaltCommand::Continue => f.write_str("continue"),
        }
    }
}

pub type HaltSender = mpsc::Sender<HaltCommand>;
pub type HaltReceiver = mpsc::Receiver<HaltCommand>;

pub fn halt_channel() -> (HaltSender, HaltReceiver) {
    mpsc::channel(16)
}
