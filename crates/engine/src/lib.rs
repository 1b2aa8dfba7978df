// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cccc-engine: the daemon's moving parts above storage.
//!
//! Inbox predicates and obligation tracking, the delivery pipeline from
//! ledger to actor sessions, the automation manager, and the event
//! broadcaster feeding `events_stream` subscribers.

pub mod automation;
pub mod broadcast;
pub mod delivery;
pub mod inbox;

pub use automation::{AutomationConfig, AutomationManager, OpFuture, OpInvoker};
pub use broadcast::{Broadcaster, StreamFrame, SubscriptionId};
pub use delivery::{render_delivery_text, render_notify_text, DeliveryPipeline};
pub use inbox::{
    has_chat_ack, latest_unread_event, obligation_status_batch, quote_text, unread_messages,
    KindFilter, ObligationStatus,
};
