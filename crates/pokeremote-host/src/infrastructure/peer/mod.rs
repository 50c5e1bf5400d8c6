//! Peer-connection backends.
//!
//! | Module | Backend                                           |
//! |--------|---------------------------------------------------|
//! | `rtc`  | the `webrtc` crate (answerer side, data channels) |
//! | `mock` | scripted in-memory peer for tests                 |

pub mod mock;
pub mod rtc;
