//! Store decorators with per-method stubs.
//!
//! Each decorator implements a store port by, in order: calling the stub
//! registered for the method, forwarding to the wrapped delegate, or failing
//! with [`tollgate_core::AppError::DelegateNil`]. Stubs live behind a lock so
//! a decorator shared through an `Arc` can be re-stubbed between test cases;
//! `cleanup` removes every stub.

use std::sync::{PoisonError, RwLock};

/// Declares the stub table of a decorator together with its setters and
/// `cleanup`.
macro_rules! define_stubs {
    (
        $decorator:ident, $stubs:ident, $port:ident;
        $( $method:ident => $setter:ident ( $($arg:ty),* ) -> $output:ty; )*
    ) => {
        #[derive(Default)]
        struct $stubs {
            $(
                $method: Option<
                    std::sync::Arc<
                        dyn Fn($($arg),*) -> tollgate_core::AppResult<$output> + Send + Sync,
                    >,
                >,
            )*
        }

        impl $decorator {
            $(
                #[doc = concat!(
                    "Stubs `", stringify!($port), "::", stringify!($method),
                    "` until the next cleanup."
                )]
                pub fn $setter<F>(&self, stub: F) -> &Self
                where
                    F: Fn($($arg),*) -> tollgate_core::AppResult<$output> + Send + Sync + 'static,
                {
                    $crate::decorators::write_stubs(&self.stubs, |stubs| {
                        stubs.$method = Some(std::sync::Arc::new(stub));
                    });
                    self
                }
            )*

            /// Removes every stub so that calls reach the delegate again.
            pub fn cleanup(&self) {
                $crate::decorators::write_stubs(&self.stubs, |stubs| *stubs = $stubs::default());
            }

            fn stub<T>(&self, select: impl FnOnce(&$stubs) -> Option<T>) -> Option<T> {
                $crate::decorators::read_stubs(&self.stubs, select)
            }

            fn delegate(&self, method: &str) -> tollgate_core::AppResult<&dyn $port> {
                self.delegate.as_deref().ok_or_else(|| {
                    tollgate_core::AppError::DelegateNil(format!(
                        concat!(stringify!($port), "::{}"),
                        method
                    ))
                })
            }
        }
    };
}

mod rbac_repository;
mod user_repository;


pub use rbac_repository::RbacRepositoryDecorator;
pub use user_repository::UserRepositoryDecorator;

pub(crate) fn read_stubs<S, T>(
    stubs: &RwLock<S>,
    select: impl FnOnce(&S) -> Option<T>,
) -> Option<T> {
    let guard = stubs.read().unwrap_or_else(PoisonError::into_inner);
    select(&guard)
}

pub(crate) fn write_stubs<S>(stubs: &RwLock<S>, update: impl FnOnce(&mut S)) {
    let mut guard = stubs.write().unwrap_or_else(PoisonError::into_inner);
    update(&mut guard);
}
