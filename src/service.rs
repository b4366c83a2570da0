//! Callables stored in definitions: instantiators, property writers, lifecycle callbacks and factory methods.
//!
//! Definitions are cloned on every merge, so the callables are boxed behind a clonable trait object.

use crate::errors::InstantiateErrorKind;

trait CloneCallable<Request, Response>: Send + Sync {
    fn call(&mut self, request: Request) -> Result<Response, InstantiateErrorKind>;

    fn clone_box(&self) -> Box<dyn CloneCallable<Request, Response>>;
}

impl<F, Request, Response> CloneCallable<Request, Response> for F
where
    F: FnMut(Request) -> Result<Response, InstantiateErrorKind> + Clone + Send + Sync + 'static,
{
    #[inline]
    fn call(&mut self, request: Request) -> Result<Response, InstantiateErrorKind> {
        self(request)
    }

    #[inline]
    fn clone_box(&self) -> Box<dyn CloneCallable<Request, Response>> {
        Box::new(self.clone())
    }
}

/// One call of user code with a request, like constructor arguments or a bean to initialize.
///
/// Clones share captured state, so a counter captured by an instantiator counts calls made through any clone.
pub(crate) struct BoxCloneService<Request, Response = ()>(Box<dyn CloneCallable<Request, Response>>);

impl<Request, Response> BoxCloneService<Request, Response> {
    #[inline]
    pub(crate) fn call(&mut self, request: Request) -> Result<Response, InstantiateErrorKind> {
        self.0.call(request)
    }
}

impl<Request, Response> Clone for BoxCloneService<Request, Response> {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

/// Boxes a closure into a [`BoxCloneService`]
#[inline]
#[must_use]
pub(crate) fn service_fn<F, Request, Response>(f: F) -> BoxCloneService<Request, Response>
where
    F: FnMut(Request) -> Result<Response, InstantiateErrorKind> + Clone + Send + Sync + 'static,
{
    BoxCloneService(Box::new(f))
}
