//! Per-request context handed through the middleware pipeline.
//!
//! Besides the parsed [`Request`], a context carries a type-erased
//! [`Extensions`] map. Earlier middleware can stash values there (a tenant id,
//! an authenticated principal) that later hooks read, for example a dynamic
//! cache-key prefix that partitions entries per tenant.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased map keyed by value type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }
}

/// Per-request state: the request plus extensions.
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    #[test]
    fn extensions_are_keyed_by_type() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut ctx = Context::new(req);
        assert!(ctx.extensions().get::<Tenant>().is_none());

        ctx.extensions_mut().insert(Tenant("acme"));
        ctx.extensions_mut().insert(7_u32);
        assert_eq!(ctx.extensions().get::<Tenant>(), Some(&Tenant("acme")));
        assert_eq!(ctx.extensions().get::<u32>(), Some(&7));

        ctx.extensions_mut().insert(Tenant("globex"));
        assert_eq!(ctx.extensions().get::<Tenant>(), Some(&Tenant("globex")));
    }
}
