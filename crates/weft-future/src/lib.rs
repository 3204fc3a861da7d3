//! Blocking promise/future pairs for thread-based pipelines.
//!
//! A [`Promise`] is the produce side and a [`Future`] the consume side of a
//! shared result slot. Futures here are deliberately *not*
//! `std::future::Future` implementations: consumers either block on
//! [`Future::wait`]/[`Future::take`] or register continuations with
//! [`Future::then`] and its variants, which run on whichever thread settles
//! the promise (or on a worker when hopped through an [`Executor`]).
//!
//! # Error model
//!
//! Everything is generic over one error parameter `E: Clone`. For code that
//! wants a dynamically-typed error channel (the moral equivalent of an
//! exception pointer) use [`DynError`]; [`Future::on_error_of`] can then
//! observe concrete error types by downcast. Typed pipelines simply pick
//! their own `E`.
//!
//! # Continuation ordering
//!
//! Continuations run in registration order, under the state lock, on the
//! thread that settles the promise. Registering against an already-settled
//! future runs the continuation synchronously in the registering thread.

mod aggregate;
mod error;
mod executor;
mod future;
mod state;

pub use aggregate::Futures;
pub use error::{DynError, FuturesError, StateError, TaskError};
pub use executor::Executor;
pub use future::{make_promise, Future, Promise};
