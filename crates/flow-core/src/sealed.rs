//! Internal sealing marker used to keep the public trait surface extensible
//! without hard-blocking downstream implementations.
//!
//! Grounded on `spark-core/src/kernel/sealed.rs`: a blanket-implemented,
//! crate-private trait that public traits (`Observable`, `Subscription`,
//! `Disposable`, …) require as a supertrait. This lets us add default
//! methods to those traits later without a breaking change, while still
//! giving a named boundary for the operators actually shipped here.
pub(crate) trait Sealed {}

impl<T: ?Sized> Sealed for T {}
