//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  StateTable                                              │
//! │  ┌─────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ GateState│ on_enter  │ on_exit  │ on_update         │  │
//! │  ├─────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Initial  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ Opening  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ …        │           │          │                   │  │
//! │  └─────────┴───────────┴──────────┴───────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each cycle the engine calls `on_update` for the **current** state.
//! If it returns `Some(next)`, the engine runs `on_exit` for the current
//! state, then `on_enter` for the next, and updates the current pointer.
//! All functions receive `&mut GateContext` which holds the debounced
//! limit readings, the pending command, output commands, and timing.

pub mod context;
pub mod states;

use crate::error::ErrorCode;
use context::GateContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all gate states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GateState {
    Initial = 0,
    Error   = 1,
    Opening = 2,
    Open    = 3,
    Closing = 4,
    Closed  = 5,
    Stopped = 6,
    Unknown = 7,
}

impl GateState {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 8;

    /// Convert a `u8` index back to `GateState`.  Panics on out-of-range in
    /// debug builds; returns `Error` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Initial,
            1 => Self::Error,
            2 => Self::Opening,
            3 => Self::Open,
            4 => Self::Closing,
            5 => Self::Closed,
            6 => Self::Stopped,
            7 => Self::Unknown,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Error
            }
        }
    }

    /// Broker-payload name.  These strings are consumed by deployed
    /// dashboards and must stay verbatim.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Initial => "INICIAL",
            Self::Error => "ERROR",
            Self::Opening => "ABRIENDO",
            Self::Open => "ABIERTO",
            Self::Closing => "CERRANDO",
            Self::Closed => "CERRADO",
            Self::Stopped => "DETENIDO",
            Self::Unknown => "DESCONOCIDO",
        }
    }

    /// Whether the motor is energized in this state.
    pub const fn is_moving(self) -> bool {
        matches!(self, Self::Opening | Self::Closing)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut GateContext);

/// Signature for the per-cycle update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut GateContext) -> Option<GateState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array — no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: GateState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]) and dispatches
/// against a mutable [`GateContext`] threaded through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `GateState as usize`.
    table: [StateDescriptor; GateState::COUNT],
    /// Index of the currently active state.
    current: usize,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; GateState::COUNT], initial: GateState) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut GateContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one cycle.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut GateContext) {
        if self.current >= GateState::COUNT {
            // Corrupted dispatch index. Unreachable through safe code, but
            // the wire contract reserves a code for it.
            ctx.error_code = ErrorCode::StateGuardrail;
            self.current = GateState::Error as usize;
            if let Some(enter) = self.table[self.current].on_enter {
                enter(ctx);
            }
            return;
        }

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (used by the emergency check to jump
    /// to `Error` regardless of what `on_update` would return).
    pub fn force_transition(&mut self, next: GateState, ctx: &mut GateContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> GateState {
        GateState::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: GateState, ctx: &mut GateContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        // Exit current state
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        // Update pointer
        self.current = next_idx;

        // Enter new state
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
