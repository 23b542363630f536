//! Lazily-resolvable closure handles.
//!
//! A [`Qrl`] names a function by `(chunk, symbol)` and carries the values the
//! function captured. It starts either resolved (built from a closure) or
//! unresolved (rebuilt from serialized state). Resolution goes through a
//! [`SymbolLoader`] and is asynchronous; once resolved, the function is
//! available synchronously through [`Qrl::resolved`].

use std::any::Any;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use serde_json::Value as Json;

use crate::component::RenderCtx;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::jsx::JsxNode;
use crate::reactive::{TaskCtx, TaskOutput, Value};

/// Renders a component.
pub type ComponentFn = dyn for<'a> Fn(&RenderCtx<'a>) -> Result<JsxNode> + Send + Sync;

/// Handles an event. Receives the listener's captures.
pub type HandlerFn = dyn Fn(&Event, &[Value]) -> Result<()> + Send + Sync;

/// Body of a task or visible task.
pub type TaskFn = dyn Fn(TaskCtx) -> TaskOutput + Send + Sync;

/// Body of a resource.
pub type ResourceFn = dyn Fn(TaskCtx) -> BoxFuture<'static, Result<Json>> + Send + Sync;

/// Derives a computed value from the symbol's captures.
pub type ComputedFn = dyn Fn(&[Value]) -> Result<Json> + Send + Sync;

/// Renders the fallback of an error boundary.
pub type FallbackFn = dyn Fn(&CoreError) -> Result<JsxNode> + Send + Sync;

/// A type-erased resolved symbol. Its concrete type is `Arc<F>`.
pub type AnySymbol = Arc<dyn Any + Send + Sync>;

/// Loads symbols by name.
pub trait SymbolLoader: Send + Sync {
    fn load(&self, chunk: &str, symbol: &str) -> BoxFuture<'static, Result<AnySymbol>>;
}

struct QrlInner<F: ?Sized> {
    chunk: Arc<str>,
    symbol: Arc<str>,
    captures: Vec<Value>,
    resolved: OnceLock<Arc<F>>,
}

/// Handle to a lazily-loaded function.
pub struct Qrl<F: ?Sized> {
    inner: Arc<QrlInner<F>>,
}

impl<F> Qrl<F>
where
    F: ?Sized + Send + Sync + 'static,
{
    /// A handle that is already resolved to `f`.
    pub fn new(chunk: &str, symbol: &str, f: Arc<F>) -> Self {
        let resolved = OnceLock::new();
        let _ = resolved.set(f);
        Self::from_parts(chunk, symbol, Vec::new(), resolved)
    }

    /// An unresolved handle.
    pub fn lazy(chunk: &str, symbol: &str) -> Self {
        Self::from_parts(chunk, symbol, Vec::new(), OnceLock::new())
    }

    fn from_parts(chunk: &str, symbol: &str, captures: Vec<Value>, resolved: OnceLock<Arc<F>>) -> Self {
        Self {
            inner: Arc::new(QrlInner {
                chunk: Arc::from(chunk),
                symbol: Arc::from(symbol),
                captures,
                resolved,
            }),
        }
    }

    /// The same symbol with `captures` attached.
    pub fn with_captures(&self, captures: Vec<Value>) -> Self {
        let resolved = OnceLock::new();
        if let Some(f) = self.inner.resolved.get() {
            let _ = resolved.set(f.clone());
        }
        Self::from_parts(&self.inner.chunk, &self.inner.symbol, captures, resolved)
    }

    pub fn chunk(&self) -> &str {
        &self.inner.chunk
    }

    pub fn symbol(&self) -> &str {
        &self.inner.symbol
    }

    /// `chunk#symbol`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.inner.chunk, self.inner.symbol)
    }

    pub fn captures(&self) -> &[Value] {
        &self.inner.captures
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.get().is_some()
    }

    /// The function, if resolved.
    pub fn resolved(&self) -> Result<Arc<F>> {
        self.inner
            .resolved
            .get()
            .cloned()
            .ok_or_else(|| CoreError::Unresolved(self.key()))
    }

    /// Resolve through `loader`. Completes immediately when already resolved.
    pub async fn resolve(&self, loader: &dyn SymbolLoader) -> Result<Arc<F>> {
        if let Some(f) = self.inner.resolved.get() {
            return Ok(f.clone());
        }
        tracing::debug!(chunk = %self.inner.chunk, symbol = %self.inner.symbol, "resolving symbol");
        let symbol = loader.load(&self.inner.chunk, &self.inner.symbol).await?;
        let f = symbol
            .downcast_ref::<Arc<F>>()
            .cloned()
            .ok_or_else(|| CoreError::SymbolType {
                symbol: self.key(),
                expected: std::any::type_name::<F>(),
            })?;
        Ok(self.inner.resolved.get_or_init(|| f).clone())
    }

    /// The resolved function as a loader symbol.
    pub fn to_symbol(&self) -> Option<AnySymbol> {
        self.inner
            .resolved
            .get()
            .map(|f| Arc::new(f.clone()) as AnySymbol)
    }

    /// Whether both handles name the same symbol.
    pub fn same_symbol<G: ?Sized>(&self, other: &Qrl<G>) -> bool {
        self.inner.chunk == other.inner.chunk && self.inner.symbol == other.inner.symbol
    }
}

impl Qrl<ComponentFn> {
    pub fn component<C>(chunk: &str, symbol: &str, render: C) -> Self
    where
        C: for<'a> Fn(&RenderCtx<'a>) -> Result<JsxNode> + Send + Sync + 'static,
    {
        let f: Arc<ComponentFn> = Arc::new(render);
        Self::new(chunk, symbol, f)
    }
}

impl Qrl<HandlerFn> {
    pub fn handler<H>(chunk: &str, symbol: &str, handler: H) -> Self
    where
        H: Fn(&Event, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        let f: Arc<HandlerFn> = Arc::new(handler);
        Self::new(chunk, symbol, f)
    }
}

impl Qrl<TaskFn> {
    pub fn task<T>(chunk: &str, symbol: &str, body: T) -> Self
    where
        T: Fn(TaskCtx) -> TaskOutput + Send + Sync + 'static,
    {
        let f: Arc<TaskFn> = Arc::new(body);
        Self::new(chunk, symbol, f)
    }
}

impl Qrl<ResourceFn> {
    pub fn resource<R>(chunk: &str, symbol: &str, body: R) -> Self
    where
        R: Fn(TaskCtx) -> BoxFuture<'static, Result<Json>> + Send + Sync + 'static,
    {
        let f: Arc<ResourceFn> = Arc::new(body);
        Self::new(chunk, symbol, f)
    }
}

impl Qrl<ComputedFn> {
    pub fn computed<C>(chunk: &str, symbol: &str, compute: C) -> Self
    where
        C: Fn(&[Value]) -> Result<Json> + Send + Sync + 'static,
    {
        let f: Arc<ComputedFn> = Arc::new(compute);
        Self::new(chunk, symbol, f)
    }
}

impl Qrl<FallbackFn> {
    pub fn fallback<R>(chunk: &str, symbol: &str, render: R) -> Self
    where
        R: Fn(&CoreError) -> Result<JsxNode> + Send + Sync + 'static,
    {
        let f: Arc<FallbackFn> = Arc::new(render);
        Self::new(chunk, symbol, f)
    }
}

impl<F: ?Sized> Clone for Qrl<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ?Sized> PartialEq for Qrl<F> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.chunk == other.inner.chunk
                && self.inner.symbol == other.inner.symbol
                && self.inner.captures == other.inner.captures)
    }
}

impl<F: ?Sized> Debug for Qrl<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Qrl")
            .field("chunk", &self.inner.chunk)
            .field("symbol", &self.inner.symbol)
            .field("captures", &self.inner.captures.len())
            .field("resolved", &self.inner.resolved.get().is_some())
            .finish()
    }
}

/// In-memory [`SymbolLoader`].
#[derive(Default)]
pub struct SymbolRegistry {
    symbols: DashMap<(String, String), AnySymbol>,
    loads: AtomicUsize,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `(chunk, symbol)`.
    pub fn register<F>(&self, chunk: &str, symbol: &str, f: Arc<F>)
    where
        F: ?Sized + Send + Sync + 'static,
    {
        self.symbols
            .insert((chunk.to_string(), symbol.to_string()), Arc::new(f) as AnySymbol);
    }

    /// Register the function behind a resolved handle.
    pub fn register_qrl<F>(&self, qrl: &Qrl<F>) -> Result<()>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        let symbol = qrl.to_symbol().ok_or_else(|| CoreError::Unresolved(qrl.key()))?;
        self.symbols
            .insert((qrl.chunk().to_string(), qrl.symbol().to_string()), symbol);
        Ok(())
    }

    pub fn contains(&self, chunk: &str, symbol: &str) -> bool {
        self.symbols
            .contains_key(&(chunk.to_string(), symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Number of successful loads served.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SymbolLoader for SymbolRegistry {
    fn load(&self, chunk: &str, symbol: &str) -> BoxFuture<'static, Result<AnySymbol>> {
        let found = self
            .symbols
            .get(&(chunk.to_string(), symbol.to_string()))
            .map(|entry| entry.value().clone());
        let result = match found {
            Some(symbol) => {
                self.loads.fetch_add(1, Ordering::SeqCst);
                Ok(symbol)
            }
            None => Err(CoreError::UnknownSymbol {
                chunk: chunk.to_string(),
                symbol: symbol.to_string(),
            }),
        };
        Box::pin(future::ready(result))
    }
}
