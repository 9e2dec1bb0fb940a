// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observer primitives: broadcasters, observable state machines and
//! state-change forwarding.

mod broadcaster;
mod forwarding;
mod state;

pub use broadcaster::{Broadcaster, ObservableId};
pub use forwarding::StateForwardingRegistry;
pub use state::{StateChangeFn, StateChangeObserver, StateMachine, Transition};
