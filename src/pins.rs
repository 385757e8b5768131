//! GPIO pin assignments for the Porton controller board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Limit switches (end-of-travel contacts)
// ---------------------------------------------------------------------------

/// Digital input: asserted (LOW on the wire) when the gate is fully open.
/// Mechanical contact to GND with internal pull-up.
pub const LIMIT_OPEN_GPIO: i32 = 32;
/// Digital input: asserted (LOW on the wire) when the gate is fully closed.
pub const LIMIT_CLOSED_GPIO: i32 = 33;

// ---------------------------------------------------------------------------
// Motor contactor outputs (BTS7960 half-bridge pair)
// ---------------------------------------------------------------------------

/// Digital output: HIGH energizes the opening direction.
pub const MOTOR_OPEN_GPIO: i32 = 25;
/// Digital output: HIGH energizes the closing direction.
/// Never driven HIGH together with [`MOTOR_OPEN_GPIO`].
pub const MOTOR_CLOSE_GPIO: i32 = 26;

// ---------------------------------------------------------------------------
// Warning lamp
// ---------------------------------------------------------------------------

/// Digital output: HIGH turns the warning lamp relay on.
pub const LAMP_GPIO: i32 = 27;
