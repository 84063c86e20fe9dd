/// Type-state markers for the builder pattern
///
/// These types track at compile time whether a transport has been chosen,
/// so a manager without one cannot be built.
use std::marker::PhantomData;

/// Marker trait for transport state
pub trait ProviderState {}

/// No provider or adapter has been set
pub struct NoProvider;
impl ProviderState for NoProvider {}

/// A provider configuration or a custom adapter has been set
pub struct HasProvider;
impl ProviderState for HasProvider {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<P> {
    _provider: PhantomData<P>,
}

impl<P> TypeState<P> {
    pub(crate) fn new() -> Self {
        Self {
            _provider: PhantomData,
        }
    }
}

impl<P> Default for TypeState<P> {
    fn default() -> Self {
        Self::new()
    }
}
