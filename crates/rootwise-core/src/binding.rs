//! Reactive resource binding.
//!
//! A [`ResourceBinding`] ties a parameterized fetch operation to a
//! `{data, loading, error}` slot that observers watch through a
//! `tokio::sync::watch` channel. Every screen that reads backend data owns
//! one.
//!
//! Each fetch is tagged with a generation number taken at issue time.
//! A result is applied only if its generation is still the latest issued,
//! so the most recently issued `refetch` decides the observed state no
//! matter in which order the network calls complete.
//!
//! Fetches run on spawned tasks. Dropping a `refetch` future stops the
//! caller waiting, not the fetch: the call still settles on completion.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::obs;

/// Boxed fetch future.
pub type FetchFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Type-erased fetch operation.
pub type FetchFn<P, T, E> = Arc<dyn Fn(P) -> FetchFuture<T, E> + Send + Sync>;

/// Observable state of a binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T, E> {
    /// Absent until the first fetch resolves successfully
    pub data: Option<T>,
    /// True exactly while the latest issued fetch is outstanding
    pub loading: bool,
    /// Failure of the latest settled fetch, cleared by the next success
    pub error: Option<E>,
}

/// Construction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingOptions {
    /// Do not issue the initial fetch on construction
    pub skip: bool,
}

struct Issued<P> {
    params: P,
    generation: u64,
}

/// Slot and issue counter, shared with the fetch tasks.
struct Shared<P, T, E> {
    issued: Mutex<Issued<P>>,
    slot: watch::Sender<ResourceState<T, E>>,
}

impl<P, T, E: Display> Shared<P, T, E> {
    fn lock_issued(&self) -> MutexGuard<'_, Issued<P>> {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, generation: u64, result: Result<T, E>) -> bool {
        let issued = self.lock_issued();
        if issued.generation != generation {
            obs::emit_fetch_discarded(generation, issued.generation);
            return false;
        }
        self.slot.send_modify(|state| {
            state.loading = false;
            match result {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                }
                Err(err) => {
                    warn!(generation, error = %err, "fetch failed");
                    state.error = Some(err);
                }
            }
        });
        true
    }

    /// The fetch panicked; clear `loading` if it was the latest call.
    fn abandon(&self, generation: u64) {
        let issued = self.lock_issued();
        if issued.generation == generation {
            warn!(generation, "fetch panicked");
            self.slot.send_modify(|state| state.loading = false);
        }
    }
}

/// Binds a fetch operation `F(params) -> Result<T, E>` to a reactive slot.
pub struct ResourceBinding<P, T, E> {
    fetch: FetchFn<P, T, E>,
    shared: Arc<Shared<P, T, E>>,
}

impl<P, T, E> ResourceBinding<P, T, E>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Display + Send + Sync + 'static,
{
    /// Create a binding and issue the initial fetch with `params`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, as the initial fetch is
    /// spawned onto it. Use [`ResourceBinding::with_options`] with `skip`
    /// to construct without a runtime.
    pub fn new<F, Fut>(fetch: F, params: P) -> Arc<Self>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::with_options(fetch, params, BindingOptions::default())
    }

    /// Create a binding; the initial fetch is issued unless `options.skip`.
    ///
    /// # Panics
    ///
    /// Panics when the initial fetch must be issued outside a Tokio runtime.
    pub fn with_options<F, Fut>(fetch: F, params: P, options: BindingOptions) -> Arc<Self>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fetch: FetchFn<P, T, E> = Arc::new(move |p| fetch(p).boxed());
        let (slot, _) = watch::channel(ResourceState {
            data: None,
            loading: false,
            error: None,
        });
        let binding = Arc::new(Self {
            fetch,
            shared: Arc::new(Shared {
                issued: Mutex::new(Issued {
                    params,
                    generation: 0,
                }),
                slot,
            }),
        });

        if !options.skip {
            // Issued synchronously so a refetch made right after construction
            // already supersedes the initial call.
            drop(binding.spawn_fetch(None));
        }
        binding
    }

    /// Re-issue the fetch with `new_params`, or with the last-used params.
    ///
    /// Returns `true` when this call's result was applied, `false` when a
    /// newer call superseded it.
    pub async fn refetch(&self, new_params: Option<P>) -> bool {
        match self.spawn_fetch(new_params).await {
            Ok(applied) => applied,
            Err(err) => {
                warn!(error = %err, "fetch task did not finish");
                false
            }
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> ResourceState<T, E> {
        self.shared.slot.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.shared.slot.borrow().data.clone()
    }

    pub fn loading(&self) -> bool {
        self.shared.slot.borrow().loading
    }

    pub fn error(&self) -> Option<E> {
        self.shared.slot.borrow().error.clone()
    }

    /// Last-used parameters.
    pub fn params(&self) -> P {
        self.shared.lock_issued().params.clone()
    }

    /// Number of fetches issued so far.
    pub fn generation(&self) -> u64 {
        self.shared.lock_issued().generation
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T, E>> {
        self.shared.slot.subscribe()
    }

    fn issue(&self, new_params: Option<P>) -> (u64, FetchFuture<T, E>) {
        let (generation, params) = {
            let mut issued = self.shared.lock_issued();
            if let Some(params) = new_params {
                issued.params = params;
            }
            issued.generation += 1;
            self.shared.slot.send_modify(|state| state.loading = true);
            (issued.generation, issued.params.clone())
        };
        debug!(generation, "fetch issued");
        (generation, (self.fetch)(params))
    }

    /// Issue a fetch and settle it on its own task.
    fn spawn_fetch(&self, new_params: Option<P>) -> JoinHandle<bool> {
        let (generation, call) = self.issue(new_params);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(result) => shared.settle(generation, result),
                Err(_) => {
                    shared.abandon(generation);
                    false
                }
            }
        })
    }
}

/// Something that can be told its data is stale.
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh(&self);
}

#[async_trait]
impl<P, T, E> Refresh for ResourceBinding<P, T, E>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Display + Send + Sync + 'static,
{
    async fn refresh(&self) {
        self.refetch(None).await;
    }
}
