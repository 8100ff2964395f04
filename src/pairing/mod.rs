//! Station pairing.
//!
//! A station requests a session and shows its token as a QR code; the user's
//! app scans it and binds with its credential. Deposits are then accepted for
//! the bound user until the session ends or its deadline passes.

mod reaper;
mod service;
mod session;

pub use reaper::SessionReaper;
pub use service::{PairingService, PairingTicket, SessionSettings, SessionView, DEFAULT_STATION};
pub use session::{PairingSession, SessionStatus, Transition};
