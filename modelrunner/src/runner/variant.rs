//! Type-level choice of run entry point.
//!
//! The threaded entry point may be called from many threads at once, so a
//! runner built with [`Threaded`] is `Sync`. The single-threaded entry point
//! must only ever see one caller at a time; a [`SingleThreaded`] runner is
//! `Send` but not `Sync`, which moves that obligation onto the type checker.
use std::cell::Cell;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

pub trait RunVariant: sealed::Sealed + Send + 'static {
    const SINGLE_THREADED: bool;
    const NAME: &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Threaded;

/// Marker for the single-threaded run entry point; never constructed.
#[derive(Debug)]
pub struct SingleThreaded {
    _not_sync: PhantomData<Cell<()>>,
}

impl sealed::Sealed for Threaded {}
impl sealed::Sealed for SingleThreaded {}

impl RunVariant for Threaded {
    const SINGLE_THREADED: bool = false;
    const NAME: &'static str = "threaded";
}

impl RunVariant for SingleThreaded {
    const SINGLE_THREADED: bool = true;
    const NAME: &'static str = "single-threaded";
}
