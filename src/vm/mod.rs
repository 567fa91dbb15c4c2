//! The interface a language runtime implements to use the belt collector.
//!
//! A binding implements [`VMBinding`], which ties together how objects are laid out
//! ([`ObjectModel`]), where references live ([`Scanning`]) and how mutators are
//! stopped and resumed ([`Collection`]). All methods are static: a binding is a type,
//! not a value.

mod collection;
mod object_model;
mod scanning;

pub use self::collection::Collection;
pub use self::object_model::ObjectModel;
pub use self::scanning::Scanning;

use crate::util::constants::BYTES_IN_WORD;

/// The `VMBinding` trait associates with each trait, and provides VM-specific constants.
pub trait VMBinding
where
    Self: Sized + 'static + Send + Sync + Default,
{
    type VMObjectModel: ObjectModel<Self>;
    type VMScanning: Scanning<Self>;
    type VMCollection: Collection<Self>;

    /// Allowed minimal alignment in bytes. Object sizes are rounded up to it.
    const MIN_ALIGNMENT: usize = BYTES_IN_WORD;
}
