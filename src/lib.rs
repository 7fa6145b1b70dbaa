//! # typebus
//!
//! **typebus** is an in-process publish/subscribe message bus.
//!
//! Listener types declare handler callbacks against one or more message
//! types; publishers emit messages and the bus dispatches them to every
//! registered handler whose declared parameter types match, under a
//! configurable matching policy.
//!
//! ## Features
//!
//! | Area                | Description                                                            | Key types / traits                        |
//! |---------------------|------------------------------------------------------------------------|-------------------------------------------|
//! | **Publishing**      | Sync publish on the caller, async publish from a worker pool.          | [`MessageBus`]                            |
//! | **Matching**        | Exact, supertype-expanding, and var-arg fan-out policies.              | [`PublishMode`]                           |
//! | **Hierarchy**       | Declared parent links with typed projections; no runtime reflection.   | [`Message`], [`ParentLink`]               |
//! | **Listeners**       | Per-type handler registration with flags and multi-message arities.    | [`Listener`], [`Handlers`]                |
//! | **Dead messages**   | Publishes that match nothing are wrapped and re-offered.               | [`DeadMessage`]                           |
//! | **Errors**          | Nothing escapes a publish; failures route to pluggable handlers.       | [`ErrorHandler`], [`PublicationError`]    |
//! | **Configuration**   | Matching policy, dispatch-pool size, queue bound.                      | [`Config`]                                |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use typebus::{Config, Handlers, Listener, Message, MessageBus, ParentLink, PublishMode};
//!
//! struct Order;
//! impl Message for Order {}
//!
//! struct RushOrder {
//!     base: Order,
//! }
//! impl Message for RushOrder {
//!     fn parents() -> Vec<ParentLink> {
//!         vec![ParentLink::to::<RushOrder, Order>(|rush| &rush.base)]
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Auditor {
//!     seen: AtomicUsize,
//! }
//!
//! impl Listener for Auditor {
//!     fn configure(handlers: &mut Handlers<Self>) {
//!         // Matches Order and, because subtypes are accepted by default,
//!         // the Order view of every RushOrder.
//!         handlers.on::<Order>(|auditor, _order| {
//!             auditor.seen.fetch_add(1, Ordering::Relaxed);
//!         });
//!     }
//! }
//!
//! let bus = MessageBus::with_config(Config {
//!     publish_mode: PublishMode::ExactWithSuperTypes,
//!     ..Config::default()
//! });
//!
//! let auditor = Arc::new(Auditor::default());
//! bus.subscribe(auditor.clone());
//!
//! bus.publish(Order);
//! bus.publish(RushOrder { base: Order });
//! assert_eq!(auditor.seen.load(Ordering::Relaxed), 2);
//! ```
//!
//! ---

mod bus;
mod config;
mod dispatch;
mod error;
mod listener;
mod message;
mod publish;
mod subscription;

// ---- Public re-exports ----

pub use bus::MessageBus;
pub use config::Config;
pub use error::{ConsoleReporter, DispatchError, ErrorHandler, PublicationError};
pub use listener::{HandlerConfig, HandlerDescriptor, Handlers, Listener};
pub use message::{AnyMessage, DeadMessage, Message, MessageType, ParentLink};
pub use publish::PublishMode;
pub use subscription::{Subscription, SubscriptionManager};
