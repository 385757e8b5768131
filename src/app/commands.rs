//! Inbound command alphabet, payload decoder, and the bounded command queue.
//!
//! Commands arrive on the broker's event thread and are consumed by the FSM
//! task, at most one per cycle.  The queue is a lock-free SPSC ring over
//! atomic slots: the producer never blocks (a full queue drops the
//! newcomer) and the consumer never blocks (empty returns `None`).

use core::sync::atomic::{AtomicU8, Ordering};
use log::warn;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Command alphabet
// ---------------------------------------------------------------------------

/// Commands the outside world can send to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateCommand {
    Open = 0,
    Close = 1,
    Stop = 2,
    Toggle = 3,
    LampOn = 4,
    LampOff = 5,
}

impl GateCommand {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Open),
            1 => Some(Self::Close),
            2 => Some(Self::Stop),
            3 => Some(Self::Toggle),
            4 => Some(Self::LampOn),
            5 => Some(Self::LampOff),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload decoder
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CmdPayload {
    cmd: String,
}

/// Parse a broker payload of the form `{"cmd": "<name>"}` (case-insensitive).
/// Anything malformed or unrecognised is dropped with a log line.
pub fn decode(payload: &[u8]) -> Option<GateCommand> {
    let parsed: CmdPayload = match serde_json::from_slice(payload) {
        Ok(p) => p,
        Err(e) => {
            warn!("cmd: unparseable payload dropped ({e})");
            return None;
        }
    };

    let cmd = parsed.cmd.as_str();
    if cmd.eq_ignore_ascii_case("OPEN") {
        Some(GateCommand::Open)
    } else if cmd.eq_ignore_ascii_case("CLOSE") {
        Some(GateCommand::Close)
    } else if cmd.eq_ignore_ascii_case("STOP") {
        Some(GateCommand::Stop)
    } else if cmd.eq_ignore_ascii_case("TOGGLE") {
        Some(GateCommand::Toggle)
    } else if cmd.eq_ignore_ascii_case("LAMP_ON") {
        Some(GateCommand::LampOn)
    } else if cmd.eq_ignore_ascii_case("LAMP_OFF") {
        Some(GateCommand::LampOff)
    } else {
        warn!("cmd: unknown command '{cmd}' dropped");
        None
    }
}

// ---------------------------------------------------------------------------
// Bounded SPSC command queue
// ---------------------------------------------------------------------------

/// Maximum number of queued commands.
pub const QUEUE_CAP: usize = 16;

/// One spare slot distinguishes full from empty.
const SLOTS: usize = QUEUE_CAP + 1;

/// Lock-free single-producer single-consumer command ring.
///
/// Producer: the broker event callback.  Consumer: the FSM task.  Every
/// slot is its own atomic, so no `unsafe` is needed and the head/tail
/// acquire/release pair keeps the slot contents visible to the consumer.
pub struct CommandQueue {
    head: AtomicU8,
    tail: AtomicU8,
    slots: [AtomicU8; SLOTS],
}

impl CommandQueue {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: AtomicU8 = AtomicU8::new(0);
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            slots: [EMPTY; SLOTS],
        }
    }

    /// Non-blocking enqueue.  Returns `false` (newcomer dropped) when full;
    /// existing entries keep their FIFO order.
    pub fn push(&self, cmd: GateCommand) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next = (head + 1) % SLOTS as u8;

        if next == tail {
            return false; // Queue full — drop command.
        }

        self.slots[head as usize].store(cmd as u8, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    /// Non-blocking dequeue.  Returns `None` when empty.
    pub fn pop(&self) -> Option<GateCommand> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None; // Empty.
        }

        let raw = self.slots[tail as usize].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % SLOTS as u8, Ordering::Release);

        GateCommand::from_u8(raw)
    }

    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        tail == head
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + SLOTS - tail) % SLOTS
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_starts_empty() {
        let q = CommandQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
        assert!(q.pop().is_none());
    }

    #[test]
    fn push_and_pop_single() {
        let q = CommandQueue::new();
        assert!(q.push(GateCommand::Open));
        assert!(!q.is_empty());
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), Some(GateCommand::Open));
        assert!(q.is_empty());
    }

    #[test]
    fn fifo_ordering() {
        let q = CommandQueue::new();
        q.push(GateCommand::Open);
        q.push(GateCommand::Stop);
        q.push(GateCommand::Close);

        assert_eq!(q.pop(), Some(GateCommand::Open));
        assert_eq!(q.pop(), Some(GateCommand::Stop));
        assert_eq!(q.pop(), Some(GateCommand::Close));
        assert!(q.pop().is_none());
    }

    #[test]
    fn overflow_drops_newcomers_and_preserves_existing() {
        let q = CommandQueue::new();
        for _ in 0..QUEUE_CAP {
            assert!(q.push(GateCommand::Toggle));
        }
        // Seventeenth entry is dropped.
        assert!(!q.push(GateCommand::Open));
        assert_eq!(q.len(), QUEUE_CAP);

        // All sixteen stored entries drain in order, none replaced.
        for _ in 0..QUEUE_CAP {
            assert_eq!(q.pop(), Some(GateCommand::Toggle));
        }
        assert!(q.pop().is_none());
    }

    #[test]
    fn decode_accepts_all_commands_case_insensitively() {
        assert_eq!(decode(br#"{"cmd":"OPEN"}"#), Some(GateCommand::Open));
        assert_eq!(decode(br#"{"cmd":"open"}"#), Some(GateCommand::Open));
        assert_eq!(decode(br#"{"cmd":"Close"}"#), Some(GateCommand::Close));
        assert_eq!(decode(br#"{"cmd":"stop"}"#), Some(GateCommand::Stop));
        assert_eq!(decode(br#"{"cmd":"tOgGlE"}"#), Some(GateCommand::Toggle));
        assert_eq!(decode(br#"{"cmd":"lamp_on"}"#), Some(GateCommand::LampOn));
        assert_eq!(decode(br#"{"cmd":"LAMP_OFF"}"#), Some(GateCommand::LampOff));
    }

    #[test]
    fn decode_drops_garbage() {
        assert_eq!(decode(b"not json"), None);
        assert_eq!(decode(br#"{"cmd":"WARP"}"#), None);
        assert_eq!(decode(br#"{"other":"OPEN"}"#), None);
        assert_eq!(decode(b""), None);
        assert_eq!(decode(br#"{"cmd":42}"#), None);
    }
}
